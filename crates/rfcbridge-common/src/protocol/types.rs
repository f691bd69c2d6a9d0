//! RPC Type Tags
//!
//! The closed set of field types the codec understands. Both codec
//! directions match on [`RfcType`] exhaustively, so adding a tag here is a
//! compile error everywhere it is not yet handled.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{Result, RfcError};

/// Type tag of a parameter or structure field.
///
/// # Type Mapping
///
/// | Tag | Host value (fill) | Host value (wrap) |
/// |-----|-------------------|-------------------|
/// | `Structure` | mapping | mapping, or bare scalar for a single unnamed field |
/// | `Table` | sequence | sequence |
/// | `Char`, `Num` | text | text (right-trimmed under `rstrip`) |
/// | `String` | text | text |
/// | `Byte`, `Xstring` | bytes | bytes |
/// | `Bcd`, `Decf16`, `Decf34` | number, decimal or text | decimal |
/// | `Float` | number, decimal or text | float |
/// | `Int`, `Int1`, `Int2`, `Int8` | integer | integer |
/// | `Date`, `Time` | date/time or text | text, or date/time under `dtime` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RfcType {
    Char,
    Date,
    Bcd,
    Time,
    Byte,
    Table,
    Num,
    Float,
    Int,
    Int2,
    Int1,
    Structure,
    Decf16,
    Decf34,
    String,
    Xstring,
    Int8,
}

impl RfcType {
    /// Every supported tag, in backend code order.
    pub const ALL: [RfcType; 17] = [
        RfcType::Char,
        RfcType::Date,
        RfcType::Bcd,
        RfcType::Time,
        RfcType::Byte,
        RfcType::Table,
        RfcType::Num,
        RfcType::Float,
        RfcType::Int,
        RfcType::Int2,
        RfcType::Int1,
        RfcType::Structure,
        RfcType::Decf16,
        RfcType::Decf34,
        RfcType::String,
        RfcType::Xstring,
        RfcType::Int8,
    ];

    /// Numeric code used by the backend library.
    pub const fn code(self) -> u32 {
        match self {
            RfcType::Char => 0,
            RfcType::Date => 1,
            RfcType::Bcd => 2,
            RfcType::Time => 3,
            RfcType::Byte => 4,
            RfcType::Table => 5,
            RfcType::Num => 6,
            RfcType::Float => 7,
            RfcType::Int => 8,
            RfcType::Int2 => 9,
            RfcType::Int1 => 10,
            RfcType::Structure => 17,
            RfcType::Decf16 => 23,
            RfcType::Decf34 => 24,
            RfcType::String => 29,
            RfcType::Xstring => 30,
            RfcType::Int8 => 31,
        }
    }

    /// Resolves a backend type code.
    ///
    /// # Errors
    ///
    /// Returns `RfcError::Internal` for codes outside the supported set
    /// (object references, XML data, UTC timestamps, ...).
    pub fn from_code(code: u32) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.code() == code)
            .ok_or_else(|| RfcError::Internal(format!("RPC type not recognized: {}", code)))
    }

    pub const fn name(self) -> &'static str {
        match self {
            RfcType::Char => "CHAR",
            RfcType::Date => "DATE",
            RfcType::Bcd => "BCD",
            RfcType::Time => "TIME",
            RfcType::Byte => "BYTE",
            RfcType::Table => "TABLE",
            RfcType::Num => "NUM",
            RfcType::Float => "FLOAT",
            RfcType::Int => "INT",
            RfcType::Int2 => "INT2",
            RfcType::Int1 => "INT1",
            RfcType::Structure => "STRUCTURE",
            RfcType::Decf16 => "DECF16",
            RfcType::Decf34 => "DECF34",
            RfcType::String => "STRING",
            RfcType::Xstring => "XSTRING",
            RfcType::Int8 => "INT8",
        }
    }

    /// Whether fields of this type reference a nested [`TypeDescription`](super::TypeDescription).
    pub const fn is_complex(self) -> bool {
        matches!(self, RfcType::Structure | RfcType::Table)
    }

    /// Whether the type is transmitted as decimal text.
    pub const fn is_decimal(self) -> bool {
        matches!(
            self,
            RfcType::Bcd | RfcType::Float | RfcType::Decf16 | RfcType::Decf34
        )
    }
}

impl fmt::Display for RfcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for RfcType {
    type Error = RfcError;

    fn try_from(code: u32) -> Result<Self> {
        Self::from_code(code)
    }
}
