//! rfcbridge Common Types
//!
//! This crate provides the protocol vocabulary shared by every layer of the
//! rfcbridge RPC client: the metadata model that describes remote functions,
//! the dynamic host values the codec marshals, the error taxonomy and the
//! connection configuration.
//!
//! # Overview
//!
//! rfcbridge lets a host application invoke remote function modules on an
//! enterprise backend and coordinate transactional units of work against it.
//! This crate contains everything that does not need a live backend:
//!
//! - **Protocol Layer**: RPC type tags, type/function descriptions, host
//!   values, unit descriptors and the error classifier
//! - **Configuration**: per-connection output policies and logon parameters
//! - **JSON Bridge**: conversions between `serde_json::Value` and host values
//!
//! # Components
//!
//! - [`protocol`] - Core protocol types (metadata, values, units, errors)
//! - [`config`] - `ConnectionConfig`, `WrapPolicy` and `ConnectionParams`
//! - [`json`] - `serde_json` conversions
//!
//! # Example
//!
//! ```
//! use rfcbridge_common::{record, RfcType, TypeDescription, Value};
//!
//! let line = TypeDescription::builder("BAPIRET2")
//!     .field("TYPE", RfcType::Char, 1, 2)
//!     .field("MESSAGE", RfcType::Char, 220, 440)
//!     .build()
//!     .unwrap();
//! assert_eq!(line.narrow_length(), 221);
//!
//! let row = record! { "TYPE" => "E", "MESSAGE" => "failed" };
//! assert_eq!(row.get("TYPE"), Some(&Value::from("E")));
//! ```

pub mod config;
pub mod json;
pub mod protocol;

pub use config::{ConnectionConfig, ConnectionParams, WrapPolicy};
pub use protocol::*;
