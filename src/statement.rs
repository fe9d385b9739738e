//! Statement building: parameter discovery, binding and batch rows, then a single execution
//! through the connection's worker.

use std::fmt;

use futures_util::StreamExt;

use crate::bridge::Connection;
use crate::driver::{ExecuteOutcome, LobLocator};
use crate::error::SqlBridgeError;
use crate::lob::LobWriteSource;
use crate::registry::BindValue;
use crate::results::RowStream;
use crate::types::{HostType, HostValue, SqlType, SqlValue};

mod binding;
mod scanner;

pub use binding::BindTarget;

use binding::BindingSet;
use scanner::ParameterLayout;

/// A SQL statement collecting binds before it runs.
///
/// Binds are converted through the connection's type registry as they are made, so an
/// unsupported value is rejected by the `bind` call itself and leaves the statement unchanged.
/// ```rust,no_run
/// # use reactive_sql_bridge::prelude::*;
/// # async fn demo(conn: &Connection) -> Result<(), SqlBridgeError> {
/// let mut insert = conn.create_statement("INSERT INTO people (id, name) VALUES (:id, :name)");
/// insert.bind(":id", 1_i64)?.bind(":name", "Ada")?.add_row()?;
/// insert.bind(":id", 2_i64)?.bind_null(":name", HostType::String)?;
/// let counts = insert.execute().await?.update_counts().to_vec();
/// assert_eq!(counts, vec![1, 1]);
/// # Ok(())
/// # }
/// ```
pub struct Statement {
    connection: Connection,
    layout: ParameterLayout,
    bindings: BindingSet,
}

impl Statement {
    pub(crate) fn new(connection: Connection, sql: &str) -> Self {
        let layout = scanner::scan(sql);
        let bindings = BindingSet::new(layout.width());
        Self {
            connection,
            layout,
            bindings,
        }
    }

    /// Number of distinct parameter slots.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layout.width()
    }

    /// Marker names by slot; `None` for positional markers.
    #[must_use]
    pub fn parameter_names(&self) -> &[Option<String>] {
        &self.layout.names
    }

    /// SQL as handed to the driver, with every marker rewritten to `?N`.
    #[must_use]
    pub fn driver_sql(&self) -> &str {
        &self.layout.sql
    }

    /// Bind a value as its host type's default SQL type.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ValidationError`] for an unknown target and
    /// [`SqlBridgeError::UnsupportedConversionError`] if the value cannot be encoded.
    pub fn bind(
        &mut self,
        target: impl Into<BindTarget>,
        value: impl Into<HostValue>,
    ) -> Result<&mut Self, SqlBridgeError> {
        self.bind_as(target.into(), value.into(), None)
    }

    /// Bind a value as an explicit SQL type.
    ///
    /// # Errors
    /// As [`Statement::bind`].
    pub fn bind_typed(
        &mut self,
        target: impl Into<BindTarget>,
        value: impl Into<HostValue>,
        sql_type: SqlType,
    ) -> Result<&mut Self, SqlBridgeError> {
        self.bind_as(target.into(), value.into(), Some(sql_type))
    }

    /// Bind a null standing in for a value of `host_type`.
    ///
    /// # Errors
    /// As [`Statement::bind`].
    pub fn bind_null(
        &mut self,
        target: impl Into<BindTarget>,
        host_type: HostType,
    ) -> Result<&mut Self, SqlBridgeError> {
        self.bind_as(target.into(), HostValue::Null(host_type), None)
    }

    fn bind_as(
        &mut self,
        target: BindTarget,
        value: HostValue,
        sql_type: Option<SqlType>,
    ) -> Result<&mut Self, SqlBridgeError> {
        let slot = self.bindings.resolve(&self.layout, &target)?;
        let encoded = self.connection.registry().encode(value, sql_type)?;
        self.bindings.set(slot, encoded);
        Ok(self)
    }

    /// Finish the current batch row and start another.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ValidationError`] naming the unbound slots; the row stays open.
    pub fn add_row(&mut self) -> Result<&mut Self, SqlBridgeError> {
        self.bindings.complete_row(&self.layout)?;
        Ok(self)
    }

    /// Run the statement once for every bound row.
    ///
    /// Bound LOB streams are uploaded into temporary LOBs first, one chunk at a time; the
    /// temporaries are released once the statement has run.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ValidationError`] if any row has unbound slots (nothing is
    /// sent), and otherwise whatever the bridge or driver reports.
    pub async fn execute(self) -> Result<StatementResult, SqlBridgeError> {
        let Statement {
            connection,
            layout,
            bindings,
        } = self;
        let rows = bindings.finish(&layout)?;

        let mut temporaries = TemporaryLobs {
            connection: connection.clone(),
            locators: Vec::new(),
        };
        let mut driver_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(row.len());
            for value in row {
                values.push(match value {
                    BindValue::Value(value) => value,
                    BindValue::Lob(source) => {
                        SqlValue::Lob(upload(&connection, source, &mut temporaries).await?)
                    }
                });
            }
            driver_rows.push(values);
        }

        tracing::debug!(
            connection = connection.id(),
            rows = driver_rows.len(),
            sql = %layout.sql,
            "executing statement"
        );
        let outcome = connection.execute_raw(layout.sql, driver_rows).await?;
        drop(temporaries);
        Ok(match outcome {
            ExecuteOutcome::UpdateCounts(counts) => StatementResult::UpdateCounts(counts),
            ExecuteOutcome::Cursor { id, columns } => {
                StatementResult::Rows(RowStream::new(connection, id, columns))
            }
        })
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("connection", &self.connection.id())
            .field("sql", &self.layout.sql)
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// Temporary LOBs created for one execution; freed when dropped.
struct TemporaryLobs {
    connection: Connection,
    locators: Vec<LobLocator>,
}

impl Drop for TemporaryLobs {
    fn drop(&mut self) {
        for locator in self.locators.drain(..) {
            self.connection.free_lob_detached(locator);
        }
    }
}

async fn upload(
    connection: &Connection,
    source: LobWriteSource,
    temporaries: &mut TemporaryLobs,
) -> Result<LobLocator, SqlBridgeError> {
    let locator = connection.create_temporary_lob(source.kind).await?;
    temporaries.locators.push(locator);
    let mut chunks = source.chunks;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if !chunk.is_empty() {
            connection.write_lob(locator, chunk).await?;
        }
    }
    Ok(locator)
}

/// What an executed statement produced.
#[derive(Debug)]
pub enum StatementResult {
    /// One count per executed batch row.
    UpdateCounts(Vec<u64>),
    Rows(RowStream),
}

impl StatementResult {
    /// Total rows changed; zero for queries.
    #[must_use]
    pub fn rows_updated(&self) -> u64 {
        self.update_counts().iter().sum()
    }

    #[must_use]
    pub fn update_counts(&self) -> &[u64] {
        match self {
            StatementResult::UpdateCounts(counts) => counts,
            StatementResult::Rows(_) => &[],
        }
    }

    /// # Errors
    /// Returns [`SqlBridgeError::ExecutionError`] if the statement did not produce rows.
    pub fn into_rows(self) -> Result<RowStream, SqlBridgeError> {
        match self {
            StatementResult::Rows(rows) => Ok(rows),
            StatementResult::UpdateCounts(_) => Err(SqlBridgeError::ExecutionError(
                "statement did not return rows".into(),
            )),
        }
    }
}
