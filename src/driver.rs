//! The narrow capability surface the bridge needs from a blocking driver.
//!
//! Every method here may block. The bridge only ever calls them from the dedicated worker
//! thread that owns the session, one call at a time.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::config::ConnectionConfiguration;
use crate::error::SqlBridgeError;
use crate::types::{SqlType, SqlValue};

/// Factory for blocking sessions. Shared across worker threads.
pub trait Driver: Send + Sync + 'static {
    /// Short name used in worker thread names and log records.
    fn name(&self) -> &'static str;

    /// Open a session. Runs on the worker thread that will own the session.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError`] if the session cannot be established.
    fn connect(
        &self,
        config: &ConnectionConfiguration,
    ) -> Result<Box<dyn DriverSession>, SqlBridgeError>;
}

/// One open blocking session.
///
/// SQL handed to [`DriverSession::execute`] uses numbered `?N` markers, one per parameter slot;
/// each entry of `rows` binds every slot once.
pub trait DriverSession {
    /// # Errors
    /// Returns [`SqlBridgeError`] on statement failure; an error that
    /// [closes the connection](SqlBridgeError::closes_connection) ends the session.
    fn execute(
        &mut self,
        sql: &str,
        rows: &[Vec<SqlValue>],
    ) -> Result<ExecuteOutcome, SqlBridgeError>;

    /// Advance a cursor by one row; `None` once exhausted.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError`] if the cursor is unknown or the fetch fails.
    fn fetch(&mut self, cursor: CursorId) -> Result<Option<Vec<SqlValue>>, SqlBridgeError>;

    /// # Errors
    /// Returns [`SqlBridgeError`] if the driver fails to release the cursor.
    fn close_cursor(&mut self, cursor: CursorId) -> Result<(), SqlBridgeError>;

    /// Read at most `max_units` bytes (BLOB) or characters (CLOB) starting at `offset`.
    /// An empty chunk marks the end of the value.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError`] if the locator is no longer valid or the read fails.
    fn read_lob(
        &mut self,
        locator: &LobLocator,
        offset: u64,
        max_units: usize,
    ) -> Result<LobChunk, SqlBridgeError>;

    /// # Errors
    /// Returns [`SqlBridgeError`] if the driver cannot allocate a temporary LOB.
    fn create_temporary_lob(&mut self, kind: LobKind) -> Result<LobLocator, SqlBridgeError>;

    /// Append one chunk to a temporary LOB.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError`] if the locator is invalid or the chunk kind does not match.
    fn write_lob(&mut self, locator: &LobLocator, chunk: LobChunk) -> Result<(), SqlBridgeError>;

    /// # Errors
    /// Returns [`SqlBridgeError`] if the driver fails to release the locator.
    fn free_lob(&mut self, locator: &LobLocator) -> Result<(), SqlBridgeError>;

    /// Cheap liveness check.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError`] if the check itself could not be performed.
    fn validate(&mut self) -> Result<bool, SqlBridgeError> {
        Ok(true)
    }

    /// # Errors
    /// Returns [`SqlBridgeError`] if the session did not shut down cleanly.
    fn close(&mut self) -> Result<(), SqlBridgeError>;
}

/// Session-scoped cursor handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(pub u64);

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cursor#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobKind {
    Blob,
    Clob,
}

/// Session-scoped reference to a large object held by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LobLocator {
    pub id: u64,
    pub kind: LobKind,
}

impl fmt::Display for LobLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            LobKind::Blob => "blob",
            LobKind::Clob => "clob",
        };
        write!(f, "{kind}#{}", self.id)
    }
}

/// One piece of a large object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobChunk {
    Bytes(Bytes),
    Text(String),
}

impl LobChunk {
    #[must_use]
    pub fn kind(&self) -> LobKind {
        match self {
            LobChunk::Bytes(_) => LobKind::Blob,
            LobChunk::Text(_) => LobKind::Clob,
        }
    }

    /// Length in driver units: bytes for BLOB chunks, characters for CLOB chunks.
    #[must_use]
    pub fn units(&self) -> usize {
        match self {
            LobChunk::Bytes(bytes) => bytes.len(),
            LobChunk::Text(text) => text.chars().count(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            LobChunk::Bytes(bytes) => bytes.is_empty(),
            LobChunk::Text(text) => text.is_empty(),
        }
    }

    #[must_use]
    pub fn empty(kind: LobKind) -> Self {
        match kind {
            LobKind::Blob => LobChunk::Bytes(Bytes::new()),
            LobKind::Clob => LobChunk::Text(String::new()),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            LobChunk::Bytes(bytes) => bytes,
            LobChunk::Text(text) => text.as_bytes(),
        }
    }
}

/// Where the last read of a `String`-backed CLOB stopped.
///
/// CLOB offsets count characters, so finding one means walking the text. Sequential chunked
/// reads resume from the remembered position instead of from the start. Only valid for text
/// that is appended to, never rewritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextCursor {
    chars: usize,
    bytes: usize,
}

impl TextCursor {
    /// Up to `limit` characters of `text` starting at character `offset`.
    pub fn slice<'a>(&mut self, text: &'a str, offset: usize, limit: usize) -> &'a str {
        let (from_chars, from_bytes) = if offset >= self.chars && text.is_char_boundary(self.bytes)
        {
            (self.chars, self.bytes)
        } else {
            (0, 0)
        };
        let (start, skipped) = advance(text, from_bytes, offset - from_chars);
        let (end, taken) = advance(text, start, limit);
        *self = Self {
            chars: from_chars + skipped + taken,
            bytes: end,
        };
        &text[start..end]
    }
}

/// Byte index `count` characters past `from`, and how many characters that actually was.
fn advance(text: &str, from: usize, count: usize) -> (usize, usize) {
    text[from..]
        .chars()
        .take(count)
        .fold((from, 0), |(at, seen), ch| (at + ch.len_utf8(), seen + 1))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub sql_type: SqlType,
}

impl ColumnMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// What a statement produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// One count per bound row (a single count for statements without parameters).
    UpdateCounts(Vec<u64>),
    /// An open cursor positioned before its first row.
    Cursor {
        id: CursorId,
        columns: Vec<ColumnMetadata>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_cursor_resumes_sequential_reads() {
        let text = "añb€c𝄞d".repeat(3);
        let mut cursor = TextCursor::default();
        let mut read = String::new();
        let mut offset = 0;
        loop {
            let chunk = cursor.slice(&text, offset, 2);
            if chunk.is_empty() {
                break;
            }
            offset += chunk.chars().count();
            read.push_str(chunk);
            assert_eq!(cursor.chars, offset);
            assert_eq!(cursor.bytes, read.len());
        }
        assert_eq!(read, text);
    }

    #[test]
    fn text_cursor_handles_rewinds_and_overruns() {
        let text = "héllo wörld";
        let mut cursor = TextCursor::default();
        assert_eq!(cursor.slice(text, 6, 3), "wör");
        assert_eq!(cursor.slice(text, 1, 4), "éllo");
        assert_eq!(cursor.slice(text, 9, 10), "ld");
        assert_eq!(cursor.slice(text, 20, 4), "");
        assert_eq!(cursor.slice(text, 0, 1), "h");
    }
}
