//! Error taxonomy and classifier.
//!
//! Backend failures are described by [`ErrorInfo`], which carries the
//! backend return code, the error group and the ABAP message fields. The
//! group is the dimension callers branch on and the one that decides
//! whether a session survives the failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const MESSAGE_MAX: usize = 512;
pub const KEY_MAX: usize = 128;
pub const MSG_CLASS_MAX: usize = 20;
pub const MSG_TYPE_MAX: usize = 1;
pub const MSG_NUMBER_MAX: usize = 3;
pub const MSG_VAR_MAX: usize = 50;

/// Return codes reported by the backend library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ReturnCode {
    Ok = 0,
    CommunicationFailure = 1,
    LogonFailure = 2,
    AbapRuntimeFailure = 3,
    AbapMessage = 4,
    AbapException = 5,
    Closed = 6,
    Canceled = 7,
    Timeout = 8,
    MemoryInsufficient = 9,
    VersionMismatch = 10,
    InvalidProtocol = 11,
    SerializationFailure = 12,
    InvalidHandle = 13,
    Retry = 14,
    ExternalFailure = 15,
    Executed = 16,
    NotFound = 17,
    NotSupported = 18,
    IllegalState = 19,
    InvalidParameter = 20,
    CodepageConversionFailure = 21,
    ConversionFailure = 22,
    BufferTooSmall = 23,
    TableMoveBof = 24,
    TableMoveEof = 25,
    StartSapguiFailure = 26,
    AbapClassException = 27,
    UnknownError = 28,
    AuthorizationFailure = 29,
}

impl ReturnCode {
    const TABLE: [(ReturnCode, &'static str); 30] = [
        (ReturnCode::Ok, "RFC_OK"),
        (
            ReturnCode::CommunicationFailure,
            "RFC_COMMUNICATION_FAILURE",
        ),
        (ReturnCode::LogonFailure, "RFC_LOGON_FAILURE"),
        (ReturnCode::AbapRuntimeFailure, "RFC_ABAP_RUNTIME_FAILURE"),
        (ReturnCode::AbapMessage, "RFC_ABAP_MESSAGE"),
        (ReturnCode::AbapException, "RFC_ABAP_EXCEPTION"),
        (ReturnCode::Closed, "RFC_CLOSED"),
        (ReturnCode::Canceled, "RFC_CANCELED"),
        (ReturnCode::Timeout, "RFC_TIMEOUT"),
        (ReturnCode::MemoryInsufficient, "RFC_MEMORY_INSUFFICIENT"),
        (ReturnCode::VersionMismatch, "RFC_VERSION_MISMATCH"),
        (ReturnCode::InvalidProtocol, "RFC_INVALID_PROTOCOL"),
        (
            ReturnCode::SerializationFailure,
            "RFC_SERIALIZATION_FAILURE",
        ),
        (ReturnCode::InvalidHandle, "RFC_INVALID_HANDLE"),
        (ReturnCode::Retry, "RFC_RETRY"),
        (ReturnCode::ExternalFailure, "RFC_EXTERNAL_FAILURE"),
        (ReturnCode::Executed, "RFC_EXECUTED"),
        (ReturnCode::NotFound, "RFC_NOT_FOUND"),
        (ReturnCode::NotSupported, "RFC_NOT_SUPPORTED"),
        (ReturnCode::IllegalState, "RFC_ILLEGAL_STATE"),
        (ReturnCode::InvalidParameter, "RFC_INVALID_PARAMETER"),
        (
            ReturnCode::CodepageConversionFailure,
            "RFC_CODEPAGE_CONVERSION_FAILURE",
        ),
        (ReturnCode::ConversionFailure, "RFC_CONVERSION_FAILURE"),
        (ReturnCode::BufferTooSmall, "RFC_BUFFER_TOO_SMALL"),
        (ReturnCode::TableMoveBof, "RFC_TABLE_MOVE_BOF"),
        (ReturnCode::TableMoveEof, "RFC_TABLE_MOVE_EOF"),
        (ReturnCode::StartSapguiFailure, "RFC_START_SAPGUI_FAILURE"),
        (ReturnCode::AbapClassException, "RFC_ABAP_CLASS_EXCEPTION"),
        (ReturnCode::UnknownError, "RFC_UNKNOWN_ERROR"),
        (
            ReturnCode::AuthorizationFailure,
            "RFC_AUTHORIZATION_FAILURE",
        ),
    ];

    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::TABLE.get(code as usize).map(|(rc, _)| *rc)
    }

    /// Textual key, e.g. `RFC_INVALID_HANDLE`.
    pub fn key(self) -> &'static str {
        Self::TABLE[self as usize].1
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Error group of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorGroup {
    AbapApplicationFailure,
    AbapRuntimeFailure,
    LogonFailure,
    CommunicationFailure,
    ExternalRuntimeFailure,
    ExternalApplicationFailure,
    ExternalAuthorizationFailure,
}

impl ErrorGroup {
    /// Derives the group for a return code the backend did not classify.
    pub fn classify(code: ReturnCode) -> Self {
        match code {
            ReturnCode::CommunicationFailure => ErrorGroup::CommunicationFailure,
            ReturnCode::LogonFailure => ErrorGroup::LogonFailure,
            ReturnCode::AbapRuntimeFailure | ReturnCode::AbapMessage => {
                ErrorGroup::AbapRuntimeFailure
            }
            ReturnCode::AbapException | ReturnCode::AbapClassException => {
                ErrorGroup::AbapApplicationFailure
            }
            ReturnCode::AuthorizationFailure => ErrorGroup::ExternalAuthorizationFailure,
            _ => ErrorGroup::ExternalRuntimeFailure,
        }
    }

    /// Failures in these groups invalidate the session handle.
    pub fn is_connection_fatal(self) -> bool {
        matches!(
            self,
            ErrorGroup::AbapRuntimeFailure
                | ErrorGroup::LogonFailure
                | ErrorGroup::CommunicationFailure
                | ErrorGroup::ExternalRuntimeFailure
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorGroup::AbapApplicationFailure => "ABAP_APPLICATION_FAILURE",
            ErrorGroup::AbapRuntimeFailure => "ABAP_RUNTIME_FAILURE",
            ErrorGroup::LogonFailure => "LOGON_FAILURE",
            ErrorGroup::CommunicationFailure => "COMMUNICATION_FAILURE",
            ErrorGroup::ExternalRuntimeFailure => "EXTERNAL_RUNTIME_FAILURE",
            ErrorGroup::ExternalApplicationFailure => "EXTERNAL_APPLICATION_FAILURE",
            ErrorGroup::ExternalAuthorizationFailure => "EXTERNAL_AUTHORIZATION_FAILURE",
        }
    }
}

impl fmt::Display for ErrorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detailed description of a backend failure.
///
/// All text fields are truncated to the backend's fixed widths on
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ReturnCode,
    pub group: ErrorGroup,
    pub key: String,
    pub message: String,
    pub msg_class: String,
    pub msg_type: String,
    pub msg_number: String,
    pub msg_v1: String,
    pub msg_v2: String,
    pub msg_v3: String,
    pub msg_v4: String,
}

impl ErrorInfo {
    /// Creates an error with the code's default key and group.
    pub fn new(code: ReturnCode, message: impl Into<String>) -> Self {
        Self {
            code,
            group: ErrorGroup::classify(code),
            key: code.key().to_string(),
            message: truncate(&message.into(), MESSAGE_MAX),
            msg_class: String::new(),
            msg_type: String::new(),
            msg_number: String::new(),
            msg_v1: String::new(),
            msg_v2: String::new(),
            msg_v3: String::new(),
            msg_v4: String::new(),
        }
    }

    pub fn with_group(mut self, group: ErrorGroup) -> Self {
        self.group = group;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = truncate(&key.into(), KEY_MAX);
        self
    }

    /// Attaches the ABAP message identification (class, type, number).
    pub fn with_abap_message(
        mut self,
        msg_class: impl Into<String>,
        msg_type: impl Into<String>,
        msg_number: impl Into<String>,
    ) -> Self {
        self.msg_class = truncate(&msg_class.into(), MSG_CLASS_MAX);
        self.msg_type = truncate(&msg_type.into(), MSG_TYPE_MAX);
        self.msg_number = truncate(&msg_number.into(), MSG_NUMBER_MAX);
        self
    }

    /// Attaches the four ABAP message variables.
    pub fn with_message_vars(mut self, vars: [&str; 4]) -> Self {
        self.msg_v1 = truncate(vars[0], MSG_VAR_MAX);
        self.msg_v2 = truncate(vars[1], MSG_VAR_MAX);
        self.msg_v3 = truncate(vars[2], MSG_VAR_MAX);
        self.msg_v4 = truncate(vars[3], MSG_VAR_MAX);
        self
    }

    pub fn invalid_handle() -> Self {
        Self::new(
            ReturnCode::InvalidHandle,
            "An invalid handle was passed to the API call",
        )
    }

    /// Unknown parameter or structure field name.
    pub fn field_not_found(name: &str) -> Self {
        Self::new(
            ReturnCode::InvalidParameter,
            format!("field '{}' not found", name),
        )
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (rc={}): {}",
            self.key,
            self.code.code(),
            self.message
        )
    }
}

/// Errors surfaced by every rfcbridge operation.
#[derive(Error, Debug)]
pub enum RfcError {
    #[error("{0}")]
    Backend(ErrorInfo),

    /// Host value of the wrong shape or content for its target field.
    #[error("{message}, received: {received}")]
    Marshal { message: String, received: String },

    /// Context added by the codec at every level of a nested fill/wrap.
    #[error("{field}: {source}")]
    Field {
        field: String,
        source: Box<RfcError>,
    },

    #[error("Unit state error: {0}")]
    State(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RfcError {
    /// Builds a marshalling error, recording the offending value.
    pub fn marshal(message: impl Into<String>, received: impl fmt::Debug) -> Self {
        RfcError::Marshal {
            message: message.into(),
            received: format!("{:?}", received),
        }
    }

    /// Wraps the error with the name of the field being processed.
    pub fn in_field(self, field: impl Into<String>) -> Self {
        RfcError::Field {
            field: field.into(),
            source: Box::new(self),
        }
    }

    /// Field names from the outermost to the innermost level.
    pub fn field_path(&self) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = self;
        while let RfcError::Field { field, source } = current {
            path.push(field.as_str());
            current = source;
        }
        path
    }

    /// The innermost error, with all field context removed.
    pub fn root(&self) -> &RfcError {
        let mut current = self;
        while let RfcError::Field { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn info(&self) -> Option<&ErrorInfo> {
        match self.root() {
            RfcError::Backend(info) => Some(info),
            _ => None,
        }
    }

    pub fn group(&self) -> Option<ErrorGroup> {
        self.info().map(|info| info.group)
    }

    pub fn is_connection_fatal(&self) -> bool {
        self.group()
            .map(ErrorGroup::is_connection_fatal)
            .unwrap_or(false)
    }

    pub fn is_marshal(&self) -> bool {
        matches!(self.root(), RfcError::Marshal { .. })
    }
}

impl From<ErrorInfo> for RfcError {
    fn from(info: ErrorInfo) -> Self {
        RfcError::Backend(info)
    }
}

pub type Result<T> = std::result::Result<T, RfcError>;

/// Attaches field context to fallible codec steps.
pub trait FieldContext<T> {
    fn in_field(self, field: &str) -> Result<T>;
}

impl<T> FieldContext<T> for Result<T> {
    fn in_field(self, field: &str) -> Result<T> {
        self.map_err(|e| e.in_field(field))
    }
}

impl<T> FieldContext<T> for std::result::Result<T, ErrorInfo> {
    fn in_field(self, field: &str) -> Result<T> {
        self.map_err(|e| RfcError::from(e).in_field(field))
    }
}

pub(crate) fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
