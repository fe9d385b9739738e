//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::bridge::{Connection, ConnectionFactory, WorkerPool};
pub use crate::config::{ConnectOptions, ConnectOptionsBuilder, ConnectionConfiguration, resolve};
pub use crate::driver::{
    ColumnMetadata, CursorId, Driver, DriverSession, ExecuteOutcome, LobChunk, LobKind,
    LobLocator, TextCursor,
};
pub use crate::error::{ConfigError, SqlBridgeError};
pub use crate::lob::{Blob, Clob, LobAccumulator};
pub use crate::registry::{BindValue, TypeMapping, TypeRegistry};
pub use crate::results::{ColumnIndex, Row, RowStream};
pub use crate::statement::{BindTarget, Statement, StatementResult};
pub use crate::types::{FromHostValue, HostType, HostValue, Period, RowId, SqlType, SqlValue};

pub use futures_util::{Stream, StreamExt};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteDriver, SqliteOptions, SqliteOptionsBuilder};
