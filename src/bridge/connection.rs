use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::{ConnectOptions, ConnectionConfiguration};
use crate::driver::{CursorId, Driver, ExecuteOutcome, LobChunk, LobKind, LobLocator};
use crate::error::SqlBridgeError;
use crate::registry::TypeRegistry;
use crate::statement::Statement;
use crate::types::SqlValue;

use super::pool::WorkerPool;
use super::worker::{Command, WorkerHandle};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opens connections for one resolved configuration.
#[derive(Clone)]
pub struct ConnectionFactory {
    driver: Arc<dyn Driver>,
    config: Arc<ConnectionConfiguration>,
    pool: WorkerPool,
    registry: Arc<TypeRegistry>,
}

impl ConnectionFactory {
    #[must_use]
    pub fn new(driver: impl Driver, config: ConnectionConfiguration) -> Self {
        Self {
            driver: Arc::new(driver),
            config: Arc::new(config),
            pool: WorkerPool::default(),
            registry: TypeRegistry::shared(),
        }
    }

    /// Resolve `options` and build a factory for the result.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ConfigError`] if the options do not resolve.
    pub fn from_options(driver: impl Driver, options: &ConnectOptions) -> Result<Self, SqlBridgeError> {
        Ok(Self::new(driver, crate::config::resolve(options)?))
    }

    /// Share a worker pool between factories.
    #[must_use]
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn configuration(&self) -> &ConnectionConfiguration {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Open a connection on its own worker thread.
    ///
    /// Nothing happens until the returned future is polled. The connect timeout, when
    /// configured, bounds the driver's connect call; the pool slot stays held until that call
    /// actually returns.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::TimeoutError`] if the connect timeout elapses, or the driver's
    /// error if the session cannot be opened.
    pub async fn create(&self) -> Result<Connection, SqlBridgeError> {
        let permit = self.pool.acquire().await?;
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            connection = id,
            driver = self.driver.name(),
            host = %self.config.host(),
            port = self.config.port(),
            "opening connection"
        );
        let worker = WorkerHandle::spawn(
            Arc::clone(&self.driver),
            ConnectionConfiguration::clone(&self.config),
            permit,
            id,
        )
        .await?;
        Ok(Connection {
            worker: Arc::new(worker),
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
        })
    }
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("driver", &self.driver.name())
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// An open connection. Clones share the same worker and session.
///
/// Operations are executed one at a time in submission order.
#[derive(Clone)]
pub struct Connection {
    worker: Arc<WorkerHandle>,
    config: Arc<ConnectionConfiguration>,
    registry: Arc<TypeRegistry>,
}

impl Connection {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.worker.state.id
    }

    #[must_use]
    pub fn configuration(&self) -> &ConnectionConfiguration {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.worker.state.is_closed()
    }

    /// False once closed, and while a cancelled call is still running in the driver.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.worker.state.check_usable().is_ok()
    }

    /// Start a statement. Placeholders (`:name` or `?`) are discovered here.
    #[must_use]
    pub fn create_statement(&self, sql: &str) -> Statement {
        Statement::new(self.clone(), sql)
    }

    /// Ask the driver whether the session is still alive. A closed connection reports `false`.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ConnectionError`] while the connection is tainted, or the
    /// statement timeout error if the check hangs.
    pub async fn validate(&self) -> Result<bool, SqlBridgeError> {
        if self.is_closed() {
            return Ok(false);
        }
        self.worker
            .request(
                |respond_to| Command::Validate { respond_to },
                self.statement_timeout(),
            )
            .await
    }

    /// Close the session after the work already queued. Closing twice is a no-op.
    ///
    /// # Errors
    /// Never fails today; the signature leaves room for drivers that report close errors.
    pub async fn close(&self) -> Result<(), SqlBridgeError> {
        self.worker.close().await;
        tracing::debug!(connection = self.id(), "connection closed");
        Ok(())
    }

    fn statement_timeout(&self) -> Option<Duration> {
        self.config.statement_timeout()
    }

    pub(crate) async fn execute_raw(
        &self,
        sql: Arc<str>,
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<ExecuteOutcome, SqlBridgeError> {
        self.worker
            .request(
                |respond_to| Command::Execute {
                    sql,
                    rows,
                    respond_to,
                },
                self.statement_timeout(),
            )
            .await
    }

    pub(crate) async fn fetch(
        &self,
        cursor: CursorId,
    ) -> Result<Option<Vec<SqlValue>>, SqlBridgeError> {
        self.worker
            .request(
                |respond_to| Command::Fetch { cursor, respond_to },
                self.statement_timeout(),
            )
            .await
    }

    pub(crate) fn close_cursor_detached(&self, cursor: CursorId) {
        self.worker.send_detached(Command::CloseCursor {
            cursor,
            respond_to: None,
        });
    }

    pub(crate) async fn read_lob(
        &self,
        locator: LobLocator,
        offset: u64,
        max_units: usize,
    ) -> Result<LobChunk, SqlBridgeError> {
        self.worker
            .request(
                |respond_to| Command::ReadLob {
                    locator,
                    offset,
                    max_units,
                    respond_to,
                },
                self.statement_timeout(),
            )
            .await
    }

    pub(crate) async fn create_temporary_lob(
        &self,
        kind: LobKind,
    ) -> Result<LobLocator, SqlBridgeError> {
        self.worker
            .request(
                |respond_to| Command::CreateTemporaryLob { kind, respond_to },
                self.statement_timeout(),
            )
            .await
    }

    pub(crate) async fn write_lob(
        &self,
        locator: LobLocator,
        chunk: LobChunk,
    ) -> Result<(), SqlBridgeError> {
        self.worker
            .request(
                |respond_to| Command::WriteLob {
                    locator,
                    chunk,
                    respond_to,
                },
                self.statement_timeout(),
            )
            .await
    }

    /// Closing a connection releases every locator, so freeing on a closed one is a no-op.
    pub(crate) async fn free_lob(&self, locator: LobLocator) -> Result<(), SqlBridgeError> {
        if self.is_closed() {
            return Ok(());
        }
        self.worker
            .request(
                |respond_to| Command::FreeLob {
                    locator,
                    respond_to: Some(respond_to),
                },
                self.statement_timeout(),
            )
            .await
    }

    pub(crate) fn free_lob_detached(&self, locator: LobLocator) {
        self.worker.send_detached(Command::FreeLob {
            locator,
            respond_to: None,
        });
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("host", &self.config.host())
            .field("closed", &self.is_closed())
            .finish()
    }
}
