pub mod error;
pub mod metadata;
pub mod types;
pub mod unit;
pub mod value;


pub use error::{ErrorGroup, ErrorInfo, FieldContext, Result, ReturnCode, RfcError};
pub use metadata::{
    Direction, FieldDescriptor, FunctionDescription, ParameterDescriptor, TypeDescription,
    TypeDescriptionBuilder,
};
pub use types::RfcType;
pub use unit::{
    Unit, UnitAttributes, UnitCall, UnitFamily, UnitIdentifier, UnitPhase, UnitState, UnitType,
};
pub use value::{Record, Value};
