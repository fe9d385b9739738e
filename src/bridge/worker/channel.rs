use std::sync::Arc;

use tokio::sync::oneshot;

use crate::driver::{CursorId, ExecuteOutcome, LobChunk, LobKind, LobLocator};
use crate::error::SqlBridgeError;
use crate::types::SqlValue;

use super::super::pending::Ticket;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SqlBridgeError>>;

/// A command plus the cancellation ticket of the caller waiting on it. Detached commands
/// (cleanup issued from `Drop`) carry no ticket and no reply.
pub(crate) struct Job {
    pub(crate) ticket: Option<Arc<Ticket>>,
    pub(crate) command: Command,
}

pub(crate) enum Command {
    Execute {
        sql: Arc<str>,
        rows: Vec<Vec<SqlValue>>,
        respond_to: Reply<ExecuteOutcome>,
    },
    Fetch {
        cursor: CursorId,
        respond_to: Reply<Option<Vec<SqlValue>>>,
    },
    CloseCursor {
        cursor: CursorId,
        respond_to: Option<Reply<()>>,
    },
    ReadLob {
        locator: LobLocator,
        offset: u64,
        max_units: usize,
        respond_to: Reply<LobChunk>,
    },
    CreateTemporaryLob {
        kind: LobKind,
        respond_to: Reply<LobLocator>,
    },
    WriteLob {
        locator: LobLocator,
        chunk: LobChunk,
        respond_to: Reply<()>,
    },
    FreeLob {
        locator: LobLocator,
        respond_to: Option<Reply<()>>,
    },
    Validate {
        respond_to: Reply<bool>,
    },
    Close {
        respond_to: Option<Reply<()>>,
    },
    Shutdown,
}

impl Command {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Command::Execute { .. } => "execute",
            Command::Fetch { .. } => "fetch",
            Command::CloseCursor { .. } => "close cursor",
            Command::ReadLob { .. } => "read lob",
            Command::CreateTemporaryLob { .. } => "create temporary lob",
            Command::WriteLob { .. } => "write lob",
            Command::FreeLob { .. } => "free lob",
            Command::Validate { .. } => "validate",
            Command::Close { .. } => "close",
            Command::Shutdown => "shutdown",
        }
    }
}
