//! Connection configuration.
//!
//! [`ConnectionConfig`] holds the output policies a session applies when it
//! turns backend containers into host values, plus the decimal separator
//! used when rendering numbers as text. It is fixed when the session is
//! built; the codec receives the packed [`WrapPolicy`] by value.
//!
//! [`ConnectionParams`] are the logon parameters handed to the backend
//! unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::protocol::error::{Result, RfcError};

/// Output policies of a session.
///
/// # Fields
///
/// - `rstrip` - right-trim `CHAR` and `NUM` results (default: true)
/// - `return_import_params` - include `IMPORT` parameters in results (default: false)
/// - `dtime` - return `DATE`/`TIME` results as chrono values instead of text (default: false)
/// - `decimal_separator` - radix character for decimal text (default: `.`)
///
/// # Example
///
/// ```
/// use rfcbridge_common::ConnectionConfig;
///
/// let config = ConnectionConfig::new()
///     .with_rstrip(false)
///     .with_dtime(true);
/// assert!(config.validate().is_ok());
/// assert!(config.policy().dtime());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub rstrip: bool,
    pub return_import_params: bool,
    pub dtime: bool,
    pub decimal_separator: char,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            rstrip: true,
            return_import_params: false,
            dtime: false,
            decimal_separator: '.',
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rstrip(mut self, rstrip: bool) -> Self {
        self.rstrip = rstrip;
        self
    }

    pub fn with_return_import_params(mut self, return_import_params: bool) -> Self {
        self.return_import_params = return_import_params;
        self
    }

    pub fn with_dtime(mut self, dtime: bool) -> Self {
        self.dtime = dtime;
        self
    }

    pub fn with_decimal_separator(mut self, separator: char) -> Self {
        self.decimal_separator = separator;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the decimal separator is neither `.` nor `,`.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.decimal_separator != '.' && self.decimal_separator != ',' {
            return Err(format!(
                "decimal separator must be '.' or ',' (got {:?})",
                self.decimal_separator
            ));
        }
        Ok(())
    }

    /// Packs the boolean policies into a bitmask.
    pub fn policy(&self) -> WrapPolicy {
        let mut bits = 0;
        if self.rstrip {
            bits |= WrapPolicy::RSTRIP;
        }
        if self.dtime {
            bits |= WrapPolicy::DTIME;
        }
        if self.return_import_params {
            bits |= WrapPolicy::RETURN_IMPORT_PARAMS;
        }
        WrapPolicy(bits)
    }
}

/// Bitmask of the boolean output policies, checked per field during wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WrapPolicy(u8);

impl WrapPolicy {
    pub const RSTRIP: u8 = 0b001;
    pub const DTIME: u8 = 0b010;
    pub const RETURN_IMPORT_PARAMS: u8 = 0b100;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn rstrip(self) -> bool {
        self.0 & Self::RSTRIP != 0
    }

    pub const fn dtime(self) -> bool {
        self.0 & Self::DTIME != 0
    }

    pub const fn return_import_params(self) -> bool {
        self.0 & Self::RETURN_IMPORT_PARAMS != 0
    }
}

/// Logon parameters (`ashost`, `sysnr`, `client`, `user`, `passwd`, ...).
///
/// Opaque to the client core; only the backend interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionParams(BTreeMap<String, String>);

impl ConnectionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Fails when no parameter has been given at all.
    pub fn ensure_present(&self) -> Result<()> {
        if self.is_empty() {
            return Err(RfcError::InvalidArgument(
                "Connection parameters missing".to_string(),
            ));
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnectionParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let params = iter.into_iter().map(|(k, v)| (k.into(), v.into()));
        Self(params.collect())
    }
}
