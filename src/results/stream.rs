use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Stream, StreamExt};

use crate::bridge::Connection;
use crate::driver::{ColumnMetadata, CursorId};
use crate::error::SqlBridgeError;
use crate::lob::LobContext;
use crate::types::SqlValue;

use super::row::{ColumnSet, Row};

type FetchFuture = BoxFuture<'static, Result<Option<Vec<SqlValue>>, SqlBridgeError>>;

/// Rows of an open cursor.
///
/// Each poll issues at most one fetch; nothing is read ahead of demand. Starting the next fetch
/// ends the previous row's scope, so LOB handles taken from it report
/// [`SqlBridgeError::StaleResourceError`] afterwards. The cursor is closed when the stream is
/// exhausted, fails, or is dropped.
pub struct RowStream {
    connection: Connection,
    cursor: CursorId,
    columns: Arc<ColumnSet>,
    generation: Arc<AtomicU64>,
    in_flight: Option<FetchFuture>,
    done: bool,
}

impl RowStream {
    pub(crate) fn new(connection: Connection, cursor: CursorId, columns: Vec<ColumnMetadata>) -> Self {
        Self {
            connection,
            cursor,
            columns: Arc::new(ColumnSet::new(columns)),
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: None,
            done: false,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// Drain the remaining rows into memory.
    ///
    /// # Errors
    /// Returns the first error raised while fetching or decoding.
    pub async fn collect_rows(mut self) -> Result<Vec<Row>, SqlBridgeError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn finish(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.in_flight = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.connection.close_cursor_detached(self.cursor);
    }

    fn start_fetch(&mut self) {
        // The previous row goes out of scope as soon as the next one is requested.
        self.generation.fetch_add(1, Ordering::AcqRel);
        let connection = self.connection.clone();
        let cursor = self.cursor;
        self.in_flight = Some(async move { connection.fetch(cursor).await }.boxed());
    }
}

impl Stream for RowStream {
    type Item = Result<Row, SqlBridgeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if this.in_flight.is_none() {
            this.start_fetch();
        }
        let Some(fetch) = this.in_flight.as_mut() else {
            return Poll::Ready(None);
        };
        let outcome = match fetch.poll_unpin(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(outcome) => outcome,
        };
        this.in_flight = None;
        match outcome {
            Ok(Some(values)) => {
                let context = LobContext {
                    connection: this.connection.clone(),
                    row_generation: this.generation.load(Ordering::Acquire),
                    cursor_generation: Arc::clone(&this.generation),
                };
                let row = Row::new(Arc::clone(&this.columns), values, context);
                if row.is_err() {
                    this.finish();
                }
                Poll::Ready(Some(row))
            }
            Ok(None) => {
                tracing::trace!(
                    connection = this.connection.id(),
                    cursor = this.cursor.0,
                    "cursor exhausted"
                );
                this.finish();
                Poll::Ready(None)
            }
            Err(err) => {
                this.finish();
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(
                connection = self.connection.id(),
                cursor = self.cursor.0,
                "row stream dropped before exhaustion"
            );
            self.finish();
        }
    }
}

impl fmt::Debug for RowStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowStream")
            .field("connection", &self.connection.id())
            .field("cursor", &self.cursor)
            .field("columns", &self.columns.len())
            .field("done", &self.done)
            .finish()
    }
}
