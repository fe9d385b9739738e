use std::time::Duration;

use rusqlite::OpenFlags;

use crate::bridge::ConnectionFactory;
use crate::config::ConnectionConfiguration;
use crate::driver::{Driver, DriverSession};
use crate::error::SqlBridgeError;

use super::session::SqliteSession;

const STATEMENT_CACHE_OPTION: &str = "oracle.jdbc.implicitStatementCacheSize";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for opening `SQLite` sessions.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub init_sql: Option<String>,
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        let db_path = db_path.into();
        let wal = db_path != ":memory:";
        Self {
            db_path,
            init_sql: None,
            wal,
        }
    }

    /// Run `sql` on every new session, after the pragmas.
    #[must_use]
    pub fn with_init_sql(mut self, sql: impl Into<String>) -> Self {
        self.init_sql = Some(sql.into());
        self
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn init_sql(mut self, sql: impl Into<String>) -> Self {
        self.opts.init_sql = Some(sql.into());
        self
    }

    /// Toggle `journal_mode = WAL` (on by default for file databases).
    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build a connection factory whose sessions open this database.
    #[must_use]
    pub fn build(self, config: ConnectionConfiguration) -> ConnectionFactory {
        ConnectionFactory::new(SqliteDriver::new(self.finish()), config)
    }
}

/// Blocking driver over `rusqlite`.
///
/// Host, port and credentials in the connection configuration are ignored; the statement
/// timeout becomes the busy timeout and the statement cache size option sizes rusqlite's
/// prepared statement cache.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    options: SqliteOptions,
}

impl SqliteDriver {
    #[must_use]
    pub fn new(options: SqliteOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }

    fn open(&self, config: &ConnectionConfiguration) -> Result<rusqlite::Connection, SqlBridgeError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = rusqlite::Connection::open_with_flags(&self.options.db_path, flags)?;
        conn.busy_timeout(config.statement_timeout().unwrap_or(DEFAULT_BUSY_TIMEOUT))?;
        if let Some(size) = config.extended_option(STATEMENT_CACHE_OPTION) {
            let capacity = size.parse::<usize>().map_err(|_| {
                SqlBridgeError::validation(format!(
                    "{STATEMENT_CACHE_OPTION} must be a non-negative integer, got `{size}`"
                ))
            })?;
            conn.set_prepared_statement_cache_capacity(capacity);
        }
        if self.options.wal {
            let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get(0)
            })?;
            tracing::trace!(path = %self.options.db_path, journal_mode = %mode, "sqlite pragmas set");
        }
        if let Some(sql) = &self.options.init_sql {
            conn.execute_batch(sql)?;
        }
        Ok(conn)
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connect(
        &self,
        config: &ConnectionConfiguration,
    ) -> Result<Box<dyn DriverSession>, SqlBridgeError> {
        let conn = self.open(config)?;
        Ok(Box::new(SqliteSession::new(conn)))
    }
}
