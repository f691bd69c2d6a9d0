//! Unit-of-work descriptors.
//!
//! A [`Unit`] is the value object exchanged between the caller and the
//! session. It never owns the backend handle; the session keeps that in its
//! single active-unit slot.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{truncate, Result, RfcError};
use super::value::{Record, Value};

/// Length of a transactional (tRFC/qRFC) identifier.
pub const TRANSACTION_ID_LENGTH: usize = 24;
/// Length of a background (bgRFC) unit identifier.
pub const UNIT_ID_LENGTH: usize = 32;

pub const USER_MAX: usize = 12;
pub const CLIENT_MAX: usize = 3;
pub const T_CODE_MAX: usize = 20;
pub const PROGRAM_MAX: usize = 40;

/// Protocol family of a unit, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFamily {
    /// tRFC, or qRFC when a queue name is given.
    Transactional,
    /// bgRFC.
    Background,
}

impl UnitFamily {
    pub fn from_background(background: bool) -> Self {
        if background {
            UnitFamily::Background
        } else {
            UnitFamily::Transactional
        }
    }

    pub fn id_length(self) -> usize {
        match self {
            UnitFamily::Transactional => TRANSACTION_ID_LENGTH,
            UnitFamily::Background => UNIT_ID_LENGTH,
        }
    }
}

impl fmt::Display for UnitFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitFamily::Transactional => f.write_str("transactional"),
            UnitFamily::Background => f.write_str("background"),
        }
    }
}

/// Caller-side lifecycle of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPhase {
    #[default]
    Initialized,
    Submitted,
    Confirmed,
    Destroyed,
}

/// Unit descriptor: `{id, background, queued?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub background: bool,
    /// Known only after a successful submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued: Option<bool>,
    #[serde(default)]
    pub phase: UnitPhase,
}

impl Unit {
    pub fn new(id: impl Into<String>, background: bool) -> Self {
        Self {
            id: id.into(),
            background,
            queued: None,
            phase: UnitPhase::Initialized,
        }
    }

    pub fn family(&self) -> UnitFamily {
        UnitFamily::from_background(self.background)
    }

    /// Checks that the identifier length matches the family.
    ///
    /// # Errors
    ///
    /// Returns `RfcError::InvalidArgument` when a background unit does not
    /// carry a 32-character id or a transactional one a 24-character id.
    pub fn validate(&self) -> Result<()> {
        let expected = self.family().id_length();
        let actual = self.id.chars().count();
        if actual != expected {
            return Err(RfcError::InvalidArgument(format!(
                "{} unit identifier must be {} characters, got {}",
                self.family(),
                expected,
                actual
            )));
        }
        Ok(())
    }

    /// Parses a dynamic unit descriptor.
    ///
    /// `background` accepts a boolean or the integers 0 and 1.
    pub fn from_record(record: &Record) -> Result<Self> {
        let id = match record.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(RfcError::InvalidArgument(format!(
                    "unit 'id' must be a string, received {}",
                    other.kind()
                )))
            }
            None => return Err(RfcError::InvalidArgument("unit 'id' missing".to_string())),
        };
        let background = match record.get("background") {
            Some(value) => bool_like(value).ok_or_else(|| {
                RfcError::InvalidArgument(format!(
                    "unit 'background' must be a boolean, received {}",
                    value.kind()
                ))
            })?,
            None => {
                return Err(RfcError::InvalidArgument(
                    "unit 'background' missing".to_string(),
                ))
            }
        };
        let queued = match record.get("queued") {
            None | Some(Value::Null) => None,
            Some(value) => Some(bool_like(value).ok_or_else(|| {
                RfcError::InvalidArgument(format!(
                    "unit 'queued' must be a boolean, received {}",
                    value.kind()
                ))
            })?),
        };
        Ok(Self {
            id,
            background,
            phase: if queued.is_some() {
                UnitPhase::Submitted
            } else {
                UnitPhase::Initialized
            },
            queued,
        })
    }

    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("id".to_string(), Value::from(self.id.as_str()));
        record.insert("background".to_string(), Value::Bool(self.background));
        if let Some(queued) = self.queued {
            record.insert("queued".to_string(), Value::Bool(queued));
        }
        record
    }

    pub fn mark_submitted(&mut self, queued: bool) {
        self.queued = Some(queued);
        self.phase = UnitPhase::Submitted;
    }

    pub fn mark_confirmed(&mut self) {
        self.phase = UnitPhase::Confirmed;
    }

    pub fn mark_destroyed(&mut self) {
        self.phase = UnitPhase::Destroyed;
    }
}

fn bool_like(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        _ => None,
    }
}

/// Kind of a background unit as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitType {
    /// Synchronous unit, `T`.
    #[serde(rename = "T")]
    Transactional,
    /// Queued unit, `Q`.
    #[serde(rename = "Q")]
    Queued,
}

impl UnitType {
    /// Zero queue names select `T`, any queue selects `Q`.
    pub fn for_queues(queue_names: &[String]) -> Self {
        if queue_names.is_empty() {
            UnitType::Transactional
        } else {
            UnitType::Queued
        }
    }

    pub fn as_char(self) -> char {
        match self {
            UnitType::Transactional => 'T',
            UnitType::Queued => 'Q',
        }
    }
}

/// Identifier of a created background unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitIdentifier {
    pub unit_type: UnitType,
    pub id: String,
}

impl UnitIdentifier {
    pub fn new(unit_type: UnitType, id: impl Into<String>) -> Self {
        Self {
            unit_type,
            id: id.into(),
        }
    }

    pub fn is_queued(&self) -> bool {
        self.unit_type == UnitType::Queued
    }
}

/// Processing state of a submitted background unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitState {
    NotFound,
    InProcess,
    Committed,
    RolledBack,
    Confirmed,
}

impl UnitState {
    pub fn name(self) -> &'static str {
        match self {
            UnitState::NotFound => "NOT_FOUND",
            UnitState::InProcess => "IN_PROCESS",
            UnitState::Committed => "COMMITTED",
            UnitState::RolledBack => "ROLLED_BACK",
            UnitState::Confirmed => "CONFIRMED",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sender attributes of a background unit.
///
/// Text attributes are fixed-width on the wire and are truncated to their
/// maximum length when set and again when the unit is submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitAttributes {
    pub kernel_trace: i32,
    pub sat_trace: i32,
    pub unit_history: i32,
    pub lock: i32,
    pub no_commit_check: i32,
    pub user: String,
    pub client: String,
    pub t_code: String,
    pub program: String,
}

impl UnitAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel_trace(mut self, value: i32) -> Self {
        self.kernel_trace = value;
        self
    }

    pub fn with_sat_trace(mut self, value: i32) -> Self {
        self.sat_trace = value;
        self
    }

    pub fn with_unit_history(mut self, value: i32) -> Self {
        self.unit_history = value;
        self
    }

    pub fn with_lock(mut self, value: i32) -> Self {
        self.lock = value;
        self
    }

    pub fn with_no_commit_check(mut self, value: i32) -> Self {
        self.no_commit_check = value;
        self
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.user = truncate(user, USER_MAX);
        self
    }

    pub fn with_client(mut self, client: &str) -> Self {
        self.client = truncate(client, CLIENT_MAX);
        self
    }

    pub fn with_t_code(mut self, t_code: &str) -> Self {
        self.t_code = truncate(t_code, T_CODE_MAX);
        self
    }

    pub fn with_program(mut self, program: &str) -> Self {
        self.program = truncate(program, PROGRAM_MAX);
        self
    }

    /// Parses the dynamic attributes map.
    ///
    /// # Errors
    ///
    /// Returns `RfcError::InvalidArgument` for unknown keys, non-integer
    /// flags, integers outside the 32-bit range or non-text strings.
    pub fn from_record(record: &Record) -> Result<Self> {
        let mut attributes = Self::default();
        for (key, value) in record {
            match key.as_str() {
                "kernel_trace" => attributes.kernel_trace = attribute_int(key, value)?,
                "sat_trace" => attributes.sat_trace = attribute_int(key, value)?,
                "unit_history" => attributes.unit_history = attribute_int(key, value)?,
                "lock" => attributes.lock = attribute_int(key, value)?,
                "no_commit_check" => attributes.no_commit_check = attribute_int(key, value)?,
                "user" => attributes = attributes.with_user(attribute_text(key, value)?),
                "client" => attributes = attributes.with_client(attribute_text(key, value)?),
                "t_code" => attributes = attributes.with_t_code(attribute_text(key, value)?),
                "program" => attributes = attributes.with_program(attribute_text(key, value)?),
                other => {
                    return Err(RfcError::InvalidArgument(format!(
                        "unknown unit attribute: {}",
                        other
                    )))
                }
            }
        }
        Ok(attributes)
    }

    /// Applies the wire length caps to every text attribute.
    pub fn truncated(self) -> Self {
        Self {
            user: truncate(&self.user, USER_MAX),
            client: truncate(&self.client, CLIENT_MAX),
            t_code: truncate(&self.t_code, T_CODE_MAX),
            program: truncate(&self.program, PROGRAM_MAX),
            ..self
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn attribute_int(key: &str, value: &Value) -> Result<i32> {
    match value {
        Value::Int(i) => i32::try_from(*i).map_err(|_| {
            RfcError::InvalidArgument(format!("unit attribute {} out of range: {}", key, i))
        }),
        other => Err(RfcError::InvalidArgument(format!(
            "unit attribute {} must be an integer, received {}",
            key,
            other.kind()
        ))),
    }
}

fn attribute_text<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        RfcError::InvalidArgument(format!(
            "unit attribute {} must be a string, received {}",
            key,
            value.kind()
        ))
    })
}

/// One remote call inside a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCall {
    pub function: String,
    pub params: Record,
}

impl UnitCall {
    pub fn new(function: impl Into<String>, params: Record) -> Self {
        Self {
            function: function.into(),
            params,
        }
    }
}

impl<S: Into<String>> From<(S, Record)> for UnitCall {
    fn from((function, params): (S, Record)) -> Self {
        Self::new(function, params)
    }
}
