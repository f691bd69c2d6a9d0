//! Session to a backend system.
//!
//! A [`Connection`] owns one backend handle plus the output policy its
//! codec applies. It is not internally synchronised: callers on several
//! threads must serialise access themselves, or use
//! [`AsyncConnection`](crate::AsyncConnection).
//!
//! Backend failures in a connection-fatal group (`COMMUNICATION_FAILURE`,
//! `LOGON_FAILURE`, `ABAP_RUNTIME_FAILURE`, `EXTERNAL_RUNTIME_FAILURE`) mark
//! the session dead. Most operations transparently reopen a dead session
//! before talking to the backend again.

use std::sync::Arc;

use tracing::{debug, info, warn};

use rfcbridge_common::{
    ConnectionConfig, ConnectionParams, FunctionDescription, Record, Result, RfcError, UnitFamily,
    UnitIdentifier, Value,
};

use crate::backend::{
    BackendResult, ConnectionAttributes, FunctionContainer, LibraryVersion, RfcBackend,
    TransactionHandle, UnitHandle,
};
use crate::codec::{fill_parameters, wrap_result, CodecOptions};

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Parameters the backend should not compute or return.
    pub not_requested: Vec<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one more parameter as not requested.
    pub fn not_requested(mut self, parameter: impl Into<String>) -> Self {
        self.not_requested.push(parameter.into());
        self
    }

    pub fn with_not_requested<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.not_requested
            .extend(parameters.into_iter().map(Into::into));
        self
    }

    /// Parses a dynamic options map.
    ///
    /// `not_requested` takes a parameter name or a list of names. Any other
    /// key is rejected.
    pub fn from_record(record: &Record) -> Result<Self> {
        let mut options = Self::new();
        for (key, value) in record {
            match (key.as_str(), value) {
                ("not_requested", Value::String(name)) => {
                    options.not_requested.push(name.clone());
                }
                ("not_requested", Value::Table(names)) => {
                    for name in names {
                        let name = name.as_str().ok_or_else(|| {
                            RfcError::InvalidArgument(format!(
                                "not_requested entries must be strings, received {}",
                                name.kind()
                            ))
                        })?;
                        options.not_requested.push(name.to_string());
                    }
                }
                ("not_requested", other) => {
                    return Err(RfcError::InvalidArgument(format!(
                        "not_requested must be a string or a list of strings, received {}",
                        other.kind()
                    )))
                }
                (unknown, _) => {
                    return Err(RfcError::InvalidArgument(format!(
                        "unknown call option '{}'",
                        unknown
                    )))
                }
            }
        }
        Ok(options)
    }
}

/// The transaction or background unit a session currently holds.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ActiveUnit {
    Transaction {
        handle: TransactionHandle,
        id: String,
    },
    Background {
        handle: UnitHandle,
        identifier: UnitIdentifier,
    },
}

impl ActiveUnit {
    pub(crate) fn id(&self) -> &str {
        match self {
            ActiveUnit::Transaction { id, .. } => id,
            ActiveUnit::Background { identifier, .. } => &identifier.id,
        }
    }

    pub(crate) fn family(&self) -> UnitFamily {
        match self {
            ActiveUnit::Transaction { .. } => UnitFamily::Transactional,
            ActiveUnit::Background { .. } => UnitFamily::Background,
        }
    }
}

/// A session with one backend system.
///
/// # Example
///
/// ```
/// use rfcbridge_client::backend::MemoryBackend;
/// use rfcbridge_client::{CallOptions, Connection};
/// use rfcbridge_common::{ConnectionConfig, ConnectionParams, Record};
///
/// let params = ConnectionParams::new().with("ashost", "10.0.0.1").with("client", "100");
/// let mut conn = Connection::open(MemoryBackend::new(), params, ConnectionConfig::default()).unwrap();
///
/// let result = conn.call("RFC_PING", &CallOptions::new(), &Record::new()).unwrap();
/// assert!(result.is_empty());
/// assert!(conn.alive());
/// ```
pub struct Connection<B: RfcBackend> {
    backend: B,
    params: ConnectionParams,
    config: ConnectionConfig,
    alive: bool,
    pub(crate) active_unit: Option<ActiveUnit>,
}

impl<B: RfcBackend> Connection<B> {
    /// Opens a session with the given logon parameters.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when `params` is empty or `config` is invalid
    /// - the backend's logon error otherwise
    pub fn open(backend: B, params: ConnectionParams, config: ConnectionConfig) -> Result<Self> {
        params.ensure_present()?;
        config.validate().map_err(RfcError::InvalidArgument)?;
        let mut connection = Self {
            backend,
            params,
            config,
            alive: false,
            active_unit: None,
        };
        connection.connect()?;
        Ok(connection)
    }

    fn connect(&mut self) -> Result<()> {
        let result = self.backend.open(&self.params);
        self.check(result)?;
        self.alive = true;
        info!(
            ashost = self.params.get("ashost").unwrap_or_default(),
            client = self.params.get("client").unwrap_or_default(),
            "Connection opened"
        );
        Ok(())
    }

    /// Closes the session, destroying any active unit first.
    ///
    /// Closing a closed session does nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(active) = self.active_unit.take() {
            warn!(unit_id = %active.id(), "Destroying active unit on close");
            if let Err(e) = self.destroy_backend_unit(&active) {
                debug!(error = %e, "Active unit could not be destroyed");
            }
        }
        self.alive = false;
        if self.backend.is_open() {
            self.backend.close()?;
            info!("Connection closed");
        }
        Ok(())
    }

    /// Closes and opens the session again.
    pub fn reopen(&mut self) -> Result<()> {
        self.close()?;
        self.connect()
    }

    /// Whether the session is usable without reopening.
    pub fn alive(&self) -> bool {
        self.alive
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Version of the native RPC library.
    pub fn version(&self) -> LibraryVersion {
        self.backend.version()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Reopens a dead session.
    pub(crate) fn ensure_alive(&mut self) -> Result<()> {
        if self.alive {
            return Ok(());
        }
        info!("Reopening dead connection");
        self.reopen()
    }

    /// Lifts a backend result, marking the session dead on a
    /// connection-fatal error.
    pub(crate) fn check<T>(&mut self, result: BackendResult<T>) -> Result<T> {
        result.map_err(|info| {
            if info.group.is_connection_fatal() {
                warn!(
                    group = %info.group,
                    key = %info.key,
                    message = %info.message,
                    "Connection-fatal error, marking connection dead"
                );
                self.alive = false;
            }
            RfcError::Backend(info)
        })
    }

    pub(crate) fn codec_options(&self) -> CodecOptions {
        CodecOptions::from(&self.config)
    }

    /// Checks the backend handle. Never reopens.
    pub fn ping(&mut self) -> Result<()> {
        let result = self.backend.ping();
        self.check(result)
    }

    pub fn get_function_description(&mut self, name: &str) -> Result<Arc<FunctionDescription>> {
        self.ensure_alive()?;
        self.describe(name)
    }

    pub(crate) fn describe(&mut self, name: &str) -> Result<Arc<FunctionDescription>> {
        let result = self.backend.function_description(name);
        self.check(result)
    }

    pub(crate) fn create_function(
        &mut self,
        description: &Arc<FunctionDescription>,
    ) -> Result<B::Function> {
        let result = self.backend.create_function(description);
        self.check(result)
    }

    /// Invokes a remote function and returns its results.
    ///
    /// The parameter container lives only for the duration of the call.
    /// `IMPORT` parameters are left out of the result unless the
    /// `return_import_params` policy is set.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty function name
    /// - `RFC_INVALID_PARAMETER` for a parameter the function does not declare
    /// - `Marshal` (wrapped in the field path) for a value the codec rejects
    /// - the backend's error for a failed invocation
    pub fn call(&mut self, name: &str, options: &CallOptions, params: &Record) -> Result<Record> {
        if name.is_empty() {
            return Err(RfcError::InvalidArgument(
                "function name must not be empty".to_string(),
            ));
        }
        self.ensure_alive()?;
        debug!(function = %name, params = params.len(), "Calling function");

        let description = self.describe(name)?;
        let mut function = self.create_function(&description)?;
        for parameter in &options.not_requested {
            function.set_active(parameter, false)?;
        }
        let codec = self.codec_options();
        fill_parameters(function.parameters_mut(), &description, params, codec)?;

        let result = self.backend.invoke(&mut function);
        self.check(result)?;

        wrap_result(function.parameters_mut(), &description, codec)
    }

    /// Identity of the session and its partner; `None` once closed.
    pub fn get_connection_attributes(&mut self) -> Result<Option<ConnectionAttributes>> {
        if !self.alive {
            return Ok(None);
        }
        let result = self.backend.connection_attributes();
        let mut attributes = self.check(result)?;
        attributes.active_unit = self.active_unit.is_some();
        Ok(Some(attributes))
    }

    /// Function description from the backend's cache for `sysid`.
    pub fn func_desc_get_cached(
        &mut self,
        sysid: &str,
        name: &str,
    ) -> Result<Arc<FunctionDescription>> {
        Ok(self.backend.cached_function_description(sysid, name)?)
    }

    pub fn func_desc_remove(&mut self, sysid: &str, name: &str) -> Result<()> {
        self.backend.remove_function_description(sysid, name)?;
        debug!(sysid = %sysid, function = %name, "Removed cached function description");
        Ok(())
    }

    pub fn type_desc_remove(&mut self, sysid: &str, name: &str) -> Result<()> {
        self.backend.remove_type_description(sysid, name)?;
        debug!(sysid = %sysid, type_name = %name, "Removed cached type description");
        Ok(())
    }

    pub(crate) fn destroy_backend_unit(&mut self, active: &ActiveUnit) -> Result<()> {
        let result = match active {
            ActiveUnit::Transaction { handle, .. } => self.backend.destroy_transaction(*handle),
            ActiveUnit::Background { handle, .. } => self.backend.destroy_unit(*handle),
        };
        self.check(result)
    }
}

impl<B: RfcBackend> Drop for Connection<B> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close connection on drop");
        }
    }
}
