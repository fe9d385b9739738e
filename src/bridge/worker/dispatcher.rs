use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Receiver;

use crate::driver::{CursorId, DriverSession, ExecuteOutcome, LobLocator};
use crate::error::SqlBridgeError;
use crate::types::SqlValue;

use super::super::pending::{ConnectionState, Ticket};
use super::channel::{Command, Job, Reply};

/// Owns the blocking session on the worker thread and tracks which LOB locators are still
/// live, so that advancing a cursor frees what the previous row vended.
struct Dispatcher<'a> {
    session: Box<dyn DriverSession>,
    state: &'a ConnectionState,
    open: bool,
    row_locators: HashMap<CursorId, Vec<LobLocator>>,
    live_locators: HashSet<LobLocator>,
}

pub(super) fn run_worker(
    session: Box<dyn DriverSession>,
    receiver: &Receiver<Job>,
    state: &ConnectionState,
) {
    let mut dispatcher = Dispatcher {
        session,
        state,
        open: true,
        row_locators: HashMap::new(),
        live_locators: HashSet::new(),
    };

    while let Ok(Job { ticket, command }) = receiver.recv() {
        if matches!(command, Command::Shutdown) {
            break;
        }
        if let Some(ticket) = ticket.as_deref()
            && ticket.is_abandoned()
        {
            tracing::trace!(
                connection = state.id,
                operation = command.label(),
                "skipping abandoned operation"
            );
            state.settle_abandoned();
            continue;
        }
        dispatcher.handle(ticket.as_deref(), command);
    }

    dispatcher.close_session("worker shut down");
    state.mark_closed();
}

impl Dispatcher<'_> {
    fn handle(&mut self, ticket: Option<&Ticket>, command: Command) {
        tracing::debug!(
            connection = self.state.id,
            operation = command.label(),
            "dispatching"
        );
        match command {
            Command::Execute {
                sql,
                rows,
                respond_to,
            } => {
                let result = self.guarded(|d| d.session.execute(&sql, &rows));
                self.deliver(ticket, Some(respond_to), result);
            }
            Command::Fetch { cursor, respond_to } => {
                let result = self.guarded(|d| d.fetch(cursor));
                self.deliver(ticket, Some(respond_to), result);
            }
            Command::CloseCursor { cursor, respond_to } => {
                let result = self.guarded(|d| d.close_cursor(cursor));
                self.deliver(ticket, respond_to, result);
            }
            Command::ReadLob {
                locator,
                offset,
                max_units,
                respond_to,
            } => {
                let result = self.guarded(|d| {
                    d.require_live(&locator)?;
                    d.session.read_lob(&locator, offset, max_units)
                });
                self.deliver(ticket, Some(respond_to), result);
            }
            Command::CreateTemporaryLob { kind, respond_to } => {
                let result = self.guarded(|d| {
                    let locator = d.session.create_temporary_lob(kind)?;
                    d.live_locators.insert(locator);
                    Ok(locator)
                });
                self.deliver(ticket, Some(respond_to), result);
            }
            Command::WriteLob {
                locator,
                chunk,
                respond_to,
            } => {
                let result = self.guarded(|d| {
                    d.require_live(&locator)?;
                    d.session.write_lob(&locator, chunk)
                });
                self.deliver(ticket, Some(respond_to), result);
            }
            Command::FreeLob {
                locator,
                respond_to,
            } => {
                let result = self.guarded(|d| d.free_lob(locator));
                self.deliver(ticket, respond_to, result);
            }
            Command::Validate { respond_to } => {
                let result = if self.open {
                    self.session.validate()
                } else {
                    Ok(false)
                };
                self.deliver(ticket, Some(respond_to), result);
            }
            Command::Close { respond_to } => {
                self.close_session("closed by caller");
                self.state.mark_closed();
                self.deliver(ticket, respond_to, Ok(()));
            }
            Command::Shutdown => {}
        }
    }

    /// Run `op` against an open session; errors that end the session close it.
    fn guarded<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, SqlBridgeError>,
    ) -> Result<T, SqlBridgeError> {
        if !self.open {
            return Err(SqlBridgeError::connection(format!(
                "connection {} is closed",
                self.state.id
            )));
        }
        let result = op(self);
        if let Err(err) = &result
            && err.closes_connection()
        {
            tracing::warn!(connection = self.state.id, error = %err, "closing connection");
            self.close_session("driver reported a fatal error");
            self.state.mark_closed();
        }
        result
    }

    fn deliver<T>(
        &mut self,
        ticket: Option<&Ticket>,
        respond_to: Option<Reply<T>>,
        result: Result<T, SqlBridgeError>,
    ) {
        if let Some(ticket) = ticket
            && !ticket.claim()
        {
            // The caller cancelled while the call was running.
            self.state.settle_abandoned();
            if let Err(err) = &result {
                tracing::warn!(
                    connection = self.state.id,
                    error = %err,
                    "cancelled operation failed; closing connection"
                );
                self.close_session("cancelled operation failed");
                self.state.mark_closed();
            }
            return;
        }
        if let Some(respond_to) = respond_to {
            let _ = respond_to.send(result);
        } else if let Err(err) = result {
            tracing::debug!(connection = self.state.id, error = %err, "detached operation failed");
        }
    }

    fn fetch(&mut self, cursor: CursorId) -> Result<Option<Vec<SqlValue>>, SqlBridgeError> {
        self.release_row(cursor)?;
        let row = self.session.fetch(cursor)?;
        if let Some(values) = &row {
            let vended: Vec<LobLocator> = values
                .iter()
                .filter_map(|value| match value {
                    SqlValue::Lob(locator) => Some(*locator),
                    _ => None,
                })
                .collect();
            self.live_locators.extend(vended.iter().copied());
            self.row_locators.insert(cursor, vended);
        }
        Ok(row)
    }

    fn close_cursor(&mut self, cursor: CursorId) -> Result<(), SqlBridgeError> {
        self.release_row(cursor)?;
        self.row_locators.remove(&cursor);
        self.session.close_cursor(cursor)
    }

    /// Free every locator the cursor's current row vended that the caller did not consume.
    fn release_row(&mut self, cursor: CursorId) -> Result<(), SqlBridgeError> {
        let Some(locators) = self.row_locators.remove(&cursor) else {
            return Ok(());
        };
        for locator in locators {
            self.free_lob(locator)?;
        }
        Ok(())
    }

    fn free_lob(&mut self, locator: LobLocator) -> Result<(), SqlBridgeError> {
        if self.live_locators.remove(&locator) {
            self.session.free_lob(&locator)?;
        }
        Ok(())
    }

    fn require_live(&self, locator: &LobLocator) -> Result<(), SqlBridgeError> {
        if self.live_locators.contains(locator) {
            Ok(())
        } else {
            Err(SqlBridgeError::stale(format!("{locator} has been released")))
        }
    }

    fn close_session(&mut self, reason: &'static str) {
        if !self.open {
            return;
        }
        self.open = false;
        self.row_locators.clear();
        self.live_locators.clear();
        if let Err(err) = self.session.close() {
            tracing::warn!(connection = self.state.id, error = %err, reason, "session close failed");
        } else {
            tracing::debug!(connection = self.state.id, reason, "session closed");
        }
    }
}
