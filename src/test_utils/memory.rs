use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use crate::config::ConnectionConfiguration;
use crate::driver::{
    ColumnMetadata, CursorId, Driver, DriverSession, ExecuteOutcome, LobChunk, LobKind, LobLocator,
    TextCursor,
};
use crate::error::SqlBridgeError;
use crate::types::{SqlType, SqlValue};

/// One scripted column value. LOB cells are handed out as locators when fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryCell {
    Value(SqlValue),
    Blob(Bytes),
    Clob(String),
}

impl From<SqlValue> for MemoryCell {
    fn from(value: SqlValue) -> Self {
        MemoryCell::Value(value)
    }
}

/// Rows returned for every statement whose SQL contains the registered key.
#[derive(Debug, Clone, Default)]
pub struct MemoryResult {
    columns: Vec<ColumnMetadata>,
    rows: Vec<Vec<MemoryCell>>,
}

impl MemoryResult {
    #[must_use]
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn column(mut self, name: &str, sql_type: SqlType) -> Self {
        self.columns.push(ColumnMetadata::new(name, sql_type));
        self
    }

    #[must_use]
    pub fn row<C: Into<MemoryCell>>(mut self, cells: impl IntoIterator<Item = C>) -> Self {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }
}

/// Errors the fake can be told to raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Execution(String),
    Communication(String),
}

impl Failure {
    fn raise(&self) -> SqlBridgeError {
        match self {
            Failure::Execution(message) => SqlBridgeError::ExecutionError(message.clone()),
            Failure::Communication(message) => SqlBridgeError::CommunicationError(message.clone()),
        }
    }
}

/// A statement as the driver received it, LOB parameters replaced by their content.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedExecution {
    pub sql: String,
    pub rows: Vec<Vec<MemoryCell>>,
}

#[derive(Default)]
struct Script {
    results: Vec<(String, MemoryResult)>,
    delays: HashMap<&'static str, Duration>,
    failures: Vec<(&'static str, Failure)>,
    connect_delay: Option<Duration>,
    handshake: Option<SocketAddr>,
    lob_chunk_limit: Option<usize>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    calls: Mutex<Vec<String>>,
    executions: Mutex<Vec<RecordedExecution>>,
    lobs: Mutex<HashMap<u64, MemoryCell>>,
    next_id: AtomicU64,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Log the call, apply its scripted delay and raise a scripted failure if one is queued.
    fn enter(&self, op: &'static str, detail: String) -> Result<(), SqlBridgeError> {
        lock(&self.calls).push(if detail.is_empty() {
            op.to_owned()
        } else {
            format!("{op} {detail}")
        });
        let (delay, failure) = {
            let mut script = lock(&self.script);
            let delay = script.delays.get(op).copied();
            let failure = script
                .failures
                .iter()
                .position(|(name, _)| *name == op)
                .map(|idx| script.failures.remove(idx).1);
            (delay, failure)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        match failure {
            Some(failure) => Err(failure.raise()),
            None => Ok(()),
        }
    }
}

/// Scripted in-memory driver for exercising the bridge without a database.
///
/// Clones share their script and observations, so a test keeps one clone for inspection while
/// the connection factory owns another.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    shared: Arc<Shared>,
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `sql` with `result`. Earlier registrations win.
    #[must_use]
    pub fn with_result(self, sql: &str, result: MemoryResult) -> Self {
        lock(&self.shared.script)
            .results
            .push((sql.to_owned(), result));
        self
    }

    /// Block every `op` call (`execute`, `fetch`, `read_lob`, ...) for `delay`.
    #[must_use]
    pub fn with_delay(self, op: &'static str, delay: Duration) -> Self {
        lock(&self.shared.script).delays.insert(op, delay);
        self
    }

    #[must_use]
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        lock(&self.shared.script).connect_delay = Some(delay);
        self
    }

    /// Open a TCP connection to `peer` and wait for one byte before the session is ready.
    #[must_use]
    pub fn with_handshake(self, peer: SocketAddr) -> Self {
        lock(&self.shared.script).handshake = Some(peer);
        self
    }

    /// Return at most `units` per LOB read, whatever the caller asks for.
    #[must_use]
    pub fn with_lob_chunk_limit(self, units: usize) -> Self {
        lock(&self.shared.script).lob_chunk_limit = Some(units);
        self
    }

    /// Fail the next `op` call with `failure`.
    pub fn fail_next(&self, op: &'static str, failure: Failure) {
        lock(&self.shared.script).failures.push((op, failure));
    }

    /// Every session call so far, as `op` or `op detail`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.shared.calls).clone()
    }

    #[must_use]
    pub fn count_calls(&self, op: &str) -> usize {
        lock(&self.shared.calls)
            .iter()
            .filter(|call| call.split(' ').next() == Some(op))
            .count()
    }

    #[must_use]
    pub fn executions(&self) -> Vec<RecordedExecution> {
        lock(&self.shared.executions).clone()
    }

    /// LOB values currently held: vended locators plus temporaries.
    #[must_use]
    pub fn open_lobs(&self) -> usize {
        lock(&self.shared.lobs).len()
    }

    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.shared.sessions_opened.load(Ordering::Acquire)
            - self.shared.sessions_closed.load(Ordering::Acquire)
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn connect(
        &self,
        config: &ConnectionConfiguration,
    ) -> Result<Box<dyn DriverSession>, SqlBridgeError> {
        self.shared.enter("connect", config.host().to_owned())?;
        let (delay, handshake) = {
            let script = lock(&self.shared.script);
            (script.connect_delay, script.handshake)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if let Some(peer) = handshake {
            let mut stream = TcpStream::connect(peer)?;
            let mut greeting = [0u8; 1];
            stream.read_exact(&mut greeting)?;
        }
        self.shared.sessions_opened.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemorySession {
            shared: Arc::clone(&self.shared),
            cursors: HashMap::new(),
            text_cursors: HashMap::new(),
            closed: false,
        }))
    }
}

struct MemorySession {
    shared: Arc<Shared>,
    cursors: HashMap<u64, VecDeque<Vec<MemoryCell>>>,
    text_cursors: HashMap<u64, TextCursor>,
    closed: bool,
}

impl MemorySession {
    fn resolve(&self, value: &SqlValue) -> Result<MemoryCell, SqlBridgeError> {
        match value {
            SqlValue::Lob(locator) => lock(&self.shared.lobs)
                .get(&locator.id)
                .cloned()
                .ok_or_else(|| SqlBridgeError::stale(format!("{locator} is not open"))),
            other => Ok(MemoryCell::Value(other.clone())),
        }
    }

    fn store(&self, cell: MemoryCell) -> LobLocator {
        let kind = match cell {
            MemoryCell::Clob(_) => LobKind::Clob,
            _ => LobKind::Blob,
        };
        let id = self.shared.next_id();
        lock(&self.shared.lobs).insert(id, cell);
        LobLocator { id, kind }
    }
}

impl DriverSession for MemorySession {
    fn execute(
        &mut self,
        sql: &str,
        rows: &[Vec<SqlValue>],
    ) -> Result<ExecuteOutcome, SqlBridgeError> {
        self.shared.enter("execute", sql.to_owned())?;
        let recorded = rows
            .iter()
            .map(|row| row.iter().map(|value| self.resolve(value)).collect())
            .collect::<Result<Vec<_>, _>>()?;
        lock(&self.shared.executions).push(RecordedExecution {
            sql: sql.to_owned(),
            rows: recorded,
        });

        let scripted = lock(&self.shared.script)
            .results
            .iter()
            .find(|(key, _)| sql.contains(key.as_str()))
            .map(|(_, result)| result.clone());
        let Some(result) = scripted else {
            return Ok(ExecuteOutcome::UpdateCounts(vec![1; rows.len()]));
        };
        let id = self.shared.next_id();
        self.cursors.insert(id, result.rows.into());
        Ok(ExecuteOutcome::Cursor {
            id: CursorId(id),
            columns: result.columns,
        })
    }

    fn fetch(&mut self, cursor: CursorId) -> Result<Option<Vec<SqlValue>>, SqlBridgeError> {
        self.shared.enter("fetch", cursor.to_string())?;
        let rows = self
            .cursors
            .get_mut(&cursor.0)
            .ok_or_else(|| SqlBridgeError::ExecutionError(format!("{cursor} is not open")))?;
        let Some(row) = rows.pop_front() else {
            return Ok(None);
        };
        Ok(Some(
            row.into_iter()
                .map(|cell| match cell {
                    MemoryCell::Value(value) => value,
                    lob => SqlValue::Lob(self.store(lob)),
                })
                .collect(),
        ))
    }

    fn close_cursor(&mut self, cursor: CursorId) -> Result<(), SqlBridgeError> {
        self.shared.enter("close_cursor", cursor.to_string())?;
        self.cursors.remove(&cursor.0);
        Ok(())
    }

    fn read_lob(
        &mut self,
        locator: &LobLocator,
        offset: u64,
        max_units: usize,
    ) -> Result<LobChunk, SqlBridgeError> {
        self.shared
            .enter("read_lob", format!("{locator}@{offset}"))?;
        let limit = lock(&self.shared.script)
            .lob_chunk_limit
            .map_or(max_units, |limit| limit.min(max_units));
        let offset = usize::try_from(offset)
            .map_err(|_| SqlBridgeError::validation(format!("offset {offset} out of range")))?;
        let lobs = lock(&self.shared.lobs);
        let cell = lobs
            .get(&locator.id)
            .ok_or_else(|| SqlBridgeError::stale(format!("{locator} is not open")))?;
        Ok(match cell {
            MemoryCell::Blob(bytes) => {
                let start = offset.min(bytes.len());
                let end = start.saturating_add(limit).min(bytes.len());
                LobChunk::Bytes(bytes.slice(start..end))
            }
            MemoryCell::Clob(text) => {
                let cursor = self.text_cursors.entry(locator.id).or_default();
                LobChunk::Text(cursor.slice(text, offset, limit).to_owned())
            }
            MemoryCell::Value(_) => LobChunk::empty(locator.kind),
        })
    }

    fn create_temporary_lob(&mut self, kind: LobKind) -> Result<LobLocator, SqlBridgeError> {
        self.shared.enter("create_temporary_lob", String::new())?;
        Ok(self.store(match kind {
            LobKind::Blob => MemoryCell::Blob(Bytes::new()),
            LobKind::Clob => MemoryCell::Clob(String::new()),
        }))
    }

    fn write_lob(&mut self, locator: &LobLocator, chunk: LobChunk) -> Result<(), SqlBridgeError> {
        self.shared
            .enter("write_lob", format!("{locator}+{}", chunk.units()))?;
        let mut lobs = lock(&self.shared.lobs);
        let cell = lobs
            .get_mut(&locator.id)
            .ok_or_else(|| SqlBridgeError::stale(format!("{locator} is not open")))?;
        match (cell, chunk) {
            (MemoryCell::Blob(buf), LobChunk::Bytes(bytes)) => {
                let mut joined = buf.to_vec();
                joined.extend_from_slice(&bytes);
                *buf = Bytes::from(joined);
            }
            (MemoryCell::Clob(buf), LobChunk::Text(text)) => buf.push_str(&text),
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
        self.shared.enter("free_lob", locator.to_string())?;
        lock(&self.shared.lobs).remove(&locator.id);
        self.text_cursors.remove(&locator.id);
        Ok(())
    }

    fn validate(&mut self) -> Result<bool, SqlBridgeError> {
        self.shared.enter("validate", String::new())?;
        Ok(!self.closed)
    }

    fn close(&mut self) -> Result<(), SqlBridgeError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.cursors.clear();
        self.shared.sessions_closed.fetch_add(1, Ordering::AcqRel);
        self.shared.enter("close", String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_rows_vend_lob_locators() {
        let driver = MemoryDriver::new().with_result(
            "FROM docs",
            MemoryResult::default()
                .column("BODY", SqlType::Clob)
                .row([MemoryCell::Clob("abcdef".into())]),
        );
        let config = crate::config::ConnectOptions::builder()
            .host("localhost")
            .resolve()
            .unwrap();
        let mut session = driver.connect(&config).unwrap();
        let ExecuteOutcome::Cursor { id, .. } =
            session.execute("SELECT body FROM docs", &[vec![]]).unwrap()
        else {
            panic!("expected a cursor");
        };
        let row = session.fetch(id).unwrap().unwrap();
        let SqlValue::Lob(locator) = row[0] else {
            panic!("expected a locator");
        };
        assert_eq!(driver.open_lobs(), 1);
        assert_eq!(
            session.read_lob(&locator, 2, 3).unwrap(),
            LobChunk::Text("cde".into())
        );
        assert_eq!(
            session.read_lob(&locator, 5, 3).unwrap(),
            LobChunk::Text("f".into())
        );
        assert_eq!(
            session.read_lob(&locator, 0, 2).unwrap(),
            LobChunk::Text("ab".into())
        );
        session.free_lob(&locator).unwrap();
        assert_eq!(driver.open_lobs(), 0);
        assert_eq!(driver.count_calls("fetch"), 1);
    }

    #[test]
    fn injected_failures_fire_once() {
        let driver = MemoryDriver::new();
        let config = crate::config::ConnectOptions::builder()
            .host("localhost")
            .resolve()
            .unwrap();
        let mut session = driver.connect(&config).unwrap();
        driver.fail_next("execute", Failure::Execution("ORA-00942".into()));
        assert!(session.execute("DELETE FROM t", &[vec![]]).is_err());
        assert_eq!(
            session.execute("DELETE FROM t", &[vec![]]).unwrap(),
            ExecuteOutcome::UpdateCounts(vec![1])
        );
    }
}
