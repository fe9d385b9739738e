use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use rusqlite::types::Value;

use crate::driver::{
    ColumnMetadata, CursorId, DriverSession, ExecuteOutcome, LobChunk, LobKind, LobLocator,
    TextCursor,
};
use crate::error::SqlBridgeError;
use crate::types::{SqlType, SqlValue};

use super::params::{from_sqlite, infer_sql_type, to_sqlite};

/// Rows of a query, read to the end when the statement ran.
struct Cursor {
    types: Vec<SqlType>,
    rows: VecDeque<Vec<Value>>,
}

enum LobContent {
    Binary(Vec<u8>),
    Text(String),
}

/// One `rusqlite` connection plus the cursors and LOB values vended from it.
pub(crate) struct SqliteSession {
    conn: Option<rusqlite::Connection>,
    cursors: HashMap<u64, Cursor>,
    lobs: HashMap<u64, LobContent>,
    text_cursors: HashMap<u64, TextCursor>,
    next_cursor: u64,
    next_lob: u64,
}

impl SqliteSession {
    pub(crate) fn new(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Some(conn),
            cursors: HashMap::new(),
            lobs: HashMap::new(),
            text_cursors: HashMap::new(),
            next_cursor: 1,
            next_lob: 1,
        }
    }

    fn conn(&self) -> Result<&rusqlite::Connection, SqlBridgeError> {
        self.conn
            .as_ref()
            .ok_or_else(|| SqlBridgeError::connection("sqlite session is closed"))
    }

    fn store_lob(&mut self, content: LobContent) -> LobLocator {
        let id = self.next_lob;
        self.next_lob += 1;
        let kind = match content {
            LobContent::Binary(_) => LobKind::Blob,
            LobContent::Text(_) => LobKind::Clob,
        };
        self.lobs.insert(id, content);
        LobLocator { id, kind }
    }

    fn lob(&self, locator: &LobLocator) -> Result<&LobContent, SqlBridgeError> {
        self.lobs
            .get(&locator.id)
            .ok_or_else(|| SqlBridgeError::stale(format!("{locator} is not open")))
    }

    fn bind_value(&self, value: &SqlValue) -> Result<Value, SqlBridgeError> {
        match value {
            SqlValue::Lob(locator) => Ok(match self.lob(locator)? {
                LobContent::Binary(bytes) => Value::Blob(bytes.clone()),
                LobContent::Text(text) => Value::Text(text.clone()),
            }),
            other => to_sqlite(other),
        }
    }

    fn bind_row(&self, row: &[SqlValue]) -> Result<Vec<Value>, SqlBridgeError> {
        row.iter().map(|value| self.bind_value(value)).collect()
    }

    /// Run a query and read its whole result into the returned cursor.
    ///
    /// SQLite is stepped to the last row here, before the first fetch. The bridge still hands
    /// rows out one per demand, but demand does not reach SQLite itself.
    fn query(&self, sql: &str, params: &[Value]) -> Result<(Vec<ColumnMetadata>, Cursor), SqlBridgeError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(sql)?;
        check_arity(&stmt, params)?;
        let declared: Vec<(String, Option<String>)> = stmt
            .columns()
            .iter()
            .map(|column| (column.name().to_owned(), column.decl_type().map(str::to_owned)))
            .collect();
        for (idx, param) in params.iter().enumerate() {
            stmt.raw_bind_parameter(idx + 1, param)?;
        }

        let width = declared.len();
        let mut rows = VecDeque::new();
        let mut raw = stmt.raw_query();
        while let Some(row) = raw.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(Value::from(row.get_ref(idx)?));
            }
            rows.push_back(values);
        }

        let sample = rows.front();
        let mut columns = Vec::with_capacity(width);
        let mut types = Vec::with_capacity(width);
        for (idx, (name, decl_type)) in declared.into_iter().enumerate() {
            let sql_type = infer_sql_type(
                decl_type.as_deref(),
                sample.and_then(|row| row.get(idx)),
            );
            types.push(sql_type);
            columns.push(ColumnMetadata::new(name, sql_type));
        }
        Ok((columns, Cursor { types, rows }))
    }

    fn run_dml(&self, sql: &str, rows: &[Vec<Value>]) -> Result<Vec<u64>, SqlBridgeError> {
        let conn = self.conn()?;
        // A caller-opened transaction is left for the caller to finish.
        let tx = if conn.is_autocommit() && rows.len() > 1 {
            Some(conn.unchecked_transaction()?)
        } else {
            None
        };
        let mut counts = Vec::with_capacity(rows.len());
        {
            let mut stmt = conn.prepare_cached(sql)?;
            for params in rows {
                check_arity(&stmt, params)?;
                for (idx, param) in params.iter().enumerate() {
                    stmt.raw_bind_parameter(idx + 1, param)?;
                }
                counts.push(stmt.raw_execute()? as u64);
            }
        }
        if let Some(tx) = tx {
            tx.commit()?;
        }
        Ok(counts)
    }
}

fn check_arity(stmt: &rusqlite::Statement<'_>, params: &[Value]) -> Result<(), SqlBridgeError> {
    let expected = stmt.parameter_count();
    if expected == params.len() {
        Ok(())
    } else {
        Err(SqlBridgeError::validation(format!(
            "statement expects {expected} parameter(s), {} bound",
            params.len()
        )))
    }
}

impl DriverSession for SqliteSession {
    fn execute(
        &mut self,
        sql: &str,
        rows: &[Vec<SqlValue>],
    ) -> Result<ExecuteOutcome, SqlBridgeError> {
        let bound = rows
            .iter()
            .map(|row| self.bind_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        let returns_rows = self.conn()?.prepare_cached(sql)?.column_count() > 0;
        if !returns_rows {
            return Ok(ExecuteOutcome::UpdateCounts(self.run_dml(sql, &bound)?));
        }

        let params = match bound.as_slice() {
            [] => &[][..],
            [single] => single.as_slice(),
            _ => {
                return Err(SqlBridgeError::validation(
                    "a query cannot run with more than one batch row",
                ));
            }
        };
        let (columns, cursor) = self.query(sql, params)?;
        let id = self.next_cursor;
        self.next_cursor += 1;
        tracing::trace!(cursor = id, rows = cursor.rows.len(), "sqlite cursor opened");
        self.cursors.insert(id, cursor);
        Ok(ExecuteOutcome::Cursor {
            id: CursorId(id),
            columns,
        })
    }

    fn fetch(&mut self, cursor: CursorId) -> Result<Option<Vec<SqlValue>>, SqlBridgeError> {
        let state = self
            .cursors
            .get_mut(&cursor.0)
            .ok_or_else(|| SqlBridgeError::ExecutionError(format!("{cursor} is not open")))?;
        let Some(row) = state.rows.pop_front() else {
            return Ok(None);
        };
        let types = state.types.clone();
        let mut values = Vec::with_capacity(row.len());
        for (value, sql_type) in row.into_iter().zip(types) {
            values.push(match (sql_type, value) {
                (_, Value::Null) => SqlValue::Null(sql_type),
                (SqlType::Blob, Value::Blob(bytes)) => {
                    SqlValue::Lob(self.store_lob(LobContent::Binary(bytes)))
                }
                (SqlType::Blob, Value::Text(text)) => {
                    SqlValue::Lob(self.store_lob(LobContent::Binary(text.into_bytes())))
                }
                (SqlType::Clob | SqlType::NClob, Value::Text(text)) => {
                    SqlValue::Lob(self.store_lob(LobContent::Text(text)))
                }
                (SqlType::Clob | SqlType::NClob, Value::Blob(bytes)) => {
                    let text = String::from_utf8(bytes).map_err(|_| {
                        SqlBridgeError::ExecutionError("CLOB column holds non UTF-8 bytes".into())
                    })?;
                    SqlValue::Lob(self.store_lob(LobContent::Text(text)))
                }
                (sql_type, value) => from_sqlite(value, sql_type)?,
            });
        }
        Ok(Some(values))
    }

    fn close_cursor(&mut self, cursor: CursorId) -> Result<(), SqlBridgeError> {
        self.cursors.remove(&cursor.0);
        Ok(())
    }

    fn read_lob(
        &mut self,
        locator: &LobLocator,
        offset: u64,
        max_units: usize,
    ) -> Result<LobChunk, SqlBridgeError> {
        let offset = usize::try_from(offset)
            .map_err(|_| SqlBridgeError::validation(format!("offset {offset} out of range")))?;
        let content = self
            .lobs
            .get(&locator.id)
            .ok_or_else(|| SqlBridgeError::stale(format!("{locator} is not open")))?;
        Ok(match content {
            LobContent::Binary(bytes) => {
                let start = offset.min(bytes.len());
                let end = start.saturating_add(max_units).min(bytes.len());
                LobChunk::Bytes(Bytes::copy_from_slice(&bytes[start..end]))
            }
            LobContent::Text(text) => {
                let cursor = self.text_cursors.entry(locator.id).or_default();
                LobChunk::Text(cursor.slice(text, offset, max_units).to_owned())
            }
        })
    }

    fn create_temporary_lob(&mut self, kind: LobKind) -> Result<LobLocator, SqlBridgeError> {
        Ok(self.store_lob(match kind {
            LobKind::Blob => LobContent::Binary(Vec::new()),
            LobKind::Clob => LobContent::Text(String::new()),
        }))
    }

    fn write_lob(&mut self, locator: &LobLocator, chunk: LobChunk) -> Result<(), SqlBridgeError> {
        let content = self
            .lobs
            .get_mut(&locator.id)
            .ok_or_else(|| SqlBridgeError::stale(format!("{locator} is not open")))?;
        match (content, chunk) {
            (LobContent::Binary(buf), LobChunk::Bytes(bytes)) => buf.extend_from_slice(&bytes),
            (LobContent::Text(buf), LobChunk::Text(text)) => buf.push_str(&text),
            (_, chunk) => {
                return Err(SqlBridgeError::validation(format!(
                    "cannot append a {:?} chunk to {locator}",
                    chunk.kind()
                )));
            }
        }
        Ok(())
    }

    fn free_lob(&mut self, locator: &LobLocator) -> Result<(), SqlBridgeError> {
        self.lobs.remove(&locator.id);
        self.text_cursors.remove(&locator.id);
        Ok(())
    }

    fn validate(&mut self) -> Result<bool, SqlBridgeError> {
        let Some(conn) = self.conn.as_ref() else {
            return Ok(false);
        };
        Ok(conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok())
    }

    fn close(&mut self) -> Result<(), SqlBridgeError> {
        self.cursors.clear();
        self.lobs.clear();
        self.text_cursors.clear();
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| SqlBridgeError::SqliteError(err))?;
        }
        Ok(())
    }
}
