//! Async façade over [`Connection`].
//!
//! Every operation runs on tokio's blocking pool, so a remote round-trip
//! never stalls the executor. Clones share one session; their operations
//! are serialised by the session mutex.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinError;

use rfcbridge_common::{
    ConnectionConfig, ConnectionParams, FunctionDescription, Record, Result, RfcError, Unit,
    UnitAttributes, UnitCall, UnitState,
};

use crate::backend::{ConnectionAttributes, RfcBackend};
use crate::connection::{CallOptions, Connection};

/// Shared, async handle to a [`Connection`].
///
/// # Example
///
/// ```
/// use rfcbridge_client::backend::MemoryBackend;
/// use rfcbridge_client::{AsyncConnection, CallOptions};
/// use rfcbridge_common::{ConnectionConfig, ConnectionParams, Record};
///
/// # #[tokio::main]
/// # async fn main() -> rfcbridge_common::Result<()> {
/// let params = ConnectionParams::new().with("ashost", "10.0.0.1");
/// let conn = AsyncConnection::open(MemoryBackend::new(), params, ConnectionConfig::default()).await?;
///
/// let worker = conn.clone();
/// let result = worker.call("RFC_PING", CallOptions::new(), Record::new()).await?;
/// assert!(result.is_empty());
/// assert!(conn.alive().await);
/// # Ok(())
/// # }
/// ```
pub struct AsyncConnection<B: RfcBackend + 'static> {
    inner: Arc<Mutex<Connection<B>>>,
}

impl<B: RfcBackend + 'static> Clone for AsyncConnection<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: RfcBackend + 'static> AsyncConnection<B> {
    pub fn new(connection: Connection<B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(connection)),
        }
    }

    /// Opens a session on the blocking pool.
    pub async fn open(
        backend: B,
        params: ConnectionParams,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let task = move || Connection::open(backend, params, config);
        let connection = tokio::task::spawn_blocking(task)
            .await
            .map_err(join_error)??;
        Ok(Self::new(connection))
    }

    /// Runs `op` with exclusive access to the session, off the executor.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection<B>) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut connection = inner.blocking_lock();
            op(&mut connection)
        })
        .await
        .map_err(join_error)?
    }

    /// Exclusive access to the underlying session.
    ///
    /// Blocking operations on the guard run on the calling task.
    pub async fn lock(&self) -> MutexGuard<'_, Connection<B>> {
        self.inner.lock().await
    }

    pub async fn alive(&self) -> bool {
        self.inner.lock().await.alive()
    }

    pub async fn call(
        &self,
        name: impl Into<String>,
        options: CallOptions,
        params: Record,
    ) -> Result<Record> {
        let name = name.into();
        self.run(move |conn| conn.call(&name, &options, &params)).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.run(|conn| conn.ping()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.run(|conn| conn.close()).await
    }

    pub async fn reopen(&self) -> Result<()> {
        self.run(|conn| conn.reopen()).await
    }

    pub async fn get_function_description(
        &self,
        name: impl Into<String>,
    ) -> Result<Arc<FunctionDescription>> {
        let name = name.into();
        self.run(move |conn| conn.get_function_description(&name)).await
    }

    pub async fn get_connection_attributes(&self) -> Result<Option<ConnectionAttributes>> {
        self.run(|conn| conn.get_connection_attributes()).await
    }

    pub async fn initialize_unit(&self, background: bool) -> Result<Unit> {
        self.run(move |conn| conn.initialize_unit(background)).await
    }

    /// Submits `unit` and returns it with `queued` set.
    pub async fn fill_and_submit_unit(
        &self,
        mut unit: Unit,
        calls: Vec<UnitCall>,
        queue_names: Vec<String>,
        attributes: Option<UnitAttributes>,
    ) -> Result<Unit> {
        self.run(move |conn| {
            conn.fill_and_submit_unit(&mut unit, &calls, &queue_names, attributes.as_ref())?;
            Ok(unit)
        })
        .await
    }

    pub async fn get_unit_state(&self, unit: Unit) -> Result<UnitState> {
        self.run(move |conn| conn.get_unit_state(&unit)).await
    }

    pub async fn confirm_unit(&self, mut unit: Unit) -> Result<Unit> {
        self.run(move |conn| {
            conn.confirm_unit(&mut unit)?;
            Ok(unit)
        })
        .await
    }

    pub async fn destroy_unit(&self, mut unit: Unit) -> Result<Unit> {
        self.run(move |conn| {
            conn.destroy_unit(&mut unit)?;
            Ok(unit)
        })
        .await
    }
}

fn join_error(e: JoinError) -> RfcError {
    RfcError::Internal(format!("spawn_blocking join error: {}", e))
}
