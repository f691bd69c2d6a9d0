//! Backend boundary.
//!
//! [`RfcBackend`] is the seam to the native RPC library: logon, metadata
//! lookup, synchronous invocation and the transactional/background unit
//! primitives. [`Container`] is the typed parameter/structure/table handle
//! the codec reads from and writes to.
//!
//! Every failure crossing this boundary is an [`ErrorInfo`]; the session
//! decides what a failure means for its liveness.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use rfcbridge_common::{ConnectionParams, ErrorInfo, Record, Value};
use rfcbridge_common::{FunctionDescription, UnitAttributes, UnitIdentifier, UnitState};

pub use memory::{Handler, MemoryBackend, MemoryContainer, MemoryFunction, MemoryTable};

pub type BackendResult<T> = std::result::Result<T, ErrorInfo>;

/// Outcome of reading variable-length data into a caller buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The value fit; the number of bytes written.
    Complete(usize),
    /// Nothing was written; the backend needs `required` bytes.
    BufferTooSmall { required: usize },
}

/// Typed access to the fields of a parameter list, structure or table row.
///
/// Setters receive the host-side rendering (text for `CHAR`, `NUM`,
/// decimal and date/time fields), the backend converts to its wire format.
pub trait Container {
    fn set_chars(&mut self, field: &str, value: &str) -> BackendResult<()>;
    fn set_string(&mut self, field: &str, value: &str) -> BackendResult<()>;
    fn set_num(&mut self, field: &str, digits: &str) -> BackendResult<()>;
    fn set_bytes(&mut self, field: &str, value: &[u8]) -> BackendResult<()>;
    fn set_xstring(&mut self, field: &str, value: &[u8]) -> BackendResult<()>;
    /// `BCD`, `FLOAT`, `DECF16` and `DECF34` fields, as decimal text.
    fn set_decimal_text(&mut self, field: &str, text: &str) -> BackendResult<()>;
    /// `INT`, `INT1` and `INT2` fields.
    fn set_int(&mut self, field: &str, value: i32) -> BackendResult<()>;
    fn set_int8(&mut self, field: &str, value: i64) -> BackendResult<()>;
    fn set_date(&mut self, field: &str, yyyymmdd: &str) -> BackendResult<()>;
    fn set_time(&mut self, field: &str, hhmmss: &str) -> BackendResult<()>;

    /// Fixed-width text of a `CHAR` field, including padding.
    fn chars(&self, field: &str) -> BackendResult<String>;
    fn num(&self, field: &str) -> BackendResult<String>;
    /// Exact byte length of a `STRING` field.
    fn string_length(&self, field: &str) -> BackendResult<usize>;
    fn read_string(&self, field: &str, buffer: &mut [u8]) -> BackendResult<ReadStatus>;
    /// Raw bytes of a `BYTE` field.
    fn read_bytes(&self, field: &str, buffer: &mut [u8]) -> BackendResult<ReadStatus>;
    fn xstring_length(&self, field: &str) -> BackendResult<usize>;
    fn read_xstring(&self, field: &str, buffer: &mut [u8]) -> BackendResult<ReadStatus>;
    /// Text of a decimal field; never truncates.
    fn read_decimal_text(&self, field: &str, buffer: &mut [u8]) -> BackendResult<ReadStatus>;
    fn float(&self, field: &str) -> BackendResult<f64>;
    fn int(&self, field: &str) -> BackendResult<i32>;
    fn int1(&self, field: &str) -> BackendResult<u8>;
    fn int2(&self, field: &str) -> BackendResult<i16>;
    fn int8(&self, field: &str) -> BackendResult<i64>;
    fn date(&self, field: &str) -> BackendResult<String>;
    fn time(&self, field: &str) -> BackendResult<String>;

    fn structure_mut(&mut self, field: &str) -> BackendResult<&mut dyn Container>;
    fn table_mut(&mut self, field: &str) -> BackendResult<&mut dyn Table>;
}

/// Rows of a `TABLE` field or parameter.
pub trait Table {
    fn row_count(&self) -> usize;
    /// Appends an initialised row and returns it for filling.
    fn append_row(&mut self) -> BackendResult<&mut dyn Container>;
    fn row_mut(&mut self, index: usize) -> BackendResult<&mut dyn Container>;
    fn delete_row(&mut self, index: usize) -> BackendResult<()>;
}

/// Parameter container of one function invocation.
///
/// Released when dropped.
pub trait FunctionContainer: Send {
    fn function_name(&self) -> &str;
    fn parameters(&self) -> &dyn Container;
    fn parameters_mut(&mut self) -> &mut dyn Container;
    /// Marks a parameter as requested or not requested by the caller.
    fn set_active(&mut self, parameter: &str, active: bool) -> BackendResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitHandle(pub u64);

/// Version of the native RPC library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryVersion {
    pub major: u32,
    pub minor: u32,
    pub patch_level: u32,
}

/// Identity of an open session and its partner system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAttributes {
    pub host: String,
    pub partner_host: String,
    pub sys_number: String,
    pub sys_id: String,
    pub client: String,
    pub user: String,
    pub language: String,
    pub trace: String,
    pub iso_language: String,
    pub codepage: String,
    pub partner_codepage: String,
    pub rfc_role: String,
    #[serde(rename = "type")]
    pub rfc_type: String,
    pub partner_type: String,
    pub rel: String,
    pub partner_rel: String,
    pub kernel_rel: String,
    pub cpic_conv_id: String,
    pub prog_name: String,
    pub partner_bytes_per_char: String,
    /// Whether the session holds a transaction or background unit.
    pub active_unit: bool,
}

impl ConnectionAttributes {
    /// Dynamic form with the backend's key names.
    pub fn to_record(&self) -> Record {
        let text = [
            ("host", &self.host),
            ("partnerHost", &self.partner_host),
            ("sysNumber", &self.sys_number),
            ("sysId", &self.sys_id),
            ("client", &self.client),
            ("user", &self.user),
            ("language", &self.language),
            ("trace", &self.trace),
            ("isoLanguage", &self.iso_language),
            ("codepage", &self.codepage),
            ("partnerCodepage", &self.partner_codepage),
            ("rfcRole", &self.rfc_role),
            ("type", &self.rfc_type),
            ("partnerType", &self.partner_type),
            ("rel", &self.rel),
            ("partnerRel", &self.partner_rel),
            ("kernelRel", &self.kernel_rel),
            ("cpicConvId", &self.cpic_conv_id),
            ("progName", &self.prog_name),
            ("partnerBytesPerChar", &self.partner_bytes_per_char),
        ];
        let mut record: Record = text
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::from(v.as_str())))
            .collect();
        record.insert("active_unit".to_string(), Value::Bool(self.active_unit));
        record
    }
}

/// Native RPC library operations used by a session.
pub trait RfcBackend: Send {
    type Function: FunctionContainer;

    fn open(&mut self, params: &ConnectionParams) -> BackendResult<()>;
    fn close(&mut self) -> BackendResult<()>;
    fn is_open(&self) -> bool;
    fn ping(&mut self) -> BackendResult<()>;

    fn function_description(&mut self, name: &str) -> BackendResult<Arc<FunctionDescription>>;
    fn create_function(
        &mut self,
        description: &Arc<FunctionDescription>,
    ) -> BackendResult<Self::Function>;
    /// Blocks for the full remote round-trip.
    fn invoke(&mut self, function: &mut Self::Function) -> BackendResult<()>;

    /// A fresh 24-character transaction id.
    fn transaction_id(&mut self) -> BackendResult<String>;
    fn create_transaction(
        &mut self,
        tid: &str,
        queue: Option<&str>,
    ) -> BackendResult<TransactionHandle>;
    fn invoke_in_transaction(
        &mut self,
        handle: TransactionHandle,
        function: &mut Self::Function,
    ) -> BackendResult<()>;
    fn submit_transaction(&mut self, handle: TransactionHandle) -> BackendResult<()>;
    fn confirm_transaction(&mut self, handle: TransactionHandle) -> BackendResult<()>;
    fn destroy_transaction(&mut self, handle: TransactionHandle) -> BackendResult<()>;

    /// A fresh 32-character background unit id.
    fn unit_id(&mut self) -> BackendResult<String>;
    fn create_unit(
        &mut self,
        id: &str,
        queue_names: &[String],
        attributes: &UnitAttributes,
    ) -> BackendResult<(UnitHandle, UnitIdentifier)>;
    fn invoke_in_unit(
        &mut self,
        handle: UnitHandle,
        function: &mut Self::Function,
    ) -> BackendResult<()>;
    fn submit_unit(&mut self, handle: UnitHandle) -> BackendResult<()>;
    fn confirm_unit(&mut self, identifier: &UnitIdentifier) -> BackendResult<()>;
    fn destroy_unit(&mut self, handle: UnitHandle) -> BackendResult<()>;
    fn unit_state(&mut self, identifier: &UnitIdentifier) -> BackendResult<UnitState>;

    fn connection_attributes(&mut self) -> BackendResult<ConnectionAttributes>;

    fn cached_function_description(
        &mut self,
        sysid: &str,
        name: &str,
    ) -> BackendResult<Arc<FunctionDescription>>;
    fn remove_function_description(&mut self, sysid: &str, name: &str) -> BackendResult<()>;
    fn remove_type_description(&mut self, sysid: &str, name: &str) -> BackendResult<()>;

    fn version(&self) -> LibraryVersion;
}
