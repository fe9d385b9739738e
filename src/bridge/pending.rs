use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::SqlBridgeError;

use super::worker::{Command, WorkerHandle};

const PENDING: u8 = 0;
const DELIVERED: u8 = 1;
const ABANDONED: u8 = 2;

/// Cancellation flag shared by a caller and the worker running its call.
///
/// Exactly one side wins: the worker claims the ticket to deliver a result, or the caller
/// abandons it and the result is discarded.
#[derive(Debug, Default)]
pub(crate) struct Ticket {
    state: AtomicU8,
}

impl Ticket {
    pub(crate) fn claim(&self) -> bool {
        self.state
            .compare_exchange(PENDING, DELIVERED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn abandon(&self) -> bool {
        self.state
            .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.state.load(Ordering::Acquire) == ABANDONED
    }
}

/// Liveness of one connection as seen by callers and its worker.
#[derive(Debug)]
pub(crate) struct ConnectionState {
    pub(crate) id: u64,
    closed: CancellationToken,
    abandoned: AtomicUsize,
}

impl ConnectionState {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            closed: CancellationToken::new(),
            abandoned: AtomicUsize::new(0),
        }
    }

    /// Gate for new work: closed connections and connections with an abandoned call still
    /// running refuse it.
    pub(crate) fn check_usable(&self) -> Result<(), SqlBridgeError> {
        if self.is_closed() {
            return Err(SqlBridgeError::connection(format!(
                "connection {} is closed",
                self.id
            )));
        }
        if self.is_tainted() {
            return Err(SqlBridgeError::connection(format!(
                "connection {} is waiting for a cancelled call to return",
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn taint(&self) {
        self.abandoned.fetch_add(1, Ordering::AcqRel);
    }

    /// The worker observed an abandoned call returning.
    pub(crate) fn settle_abandoned(&self) {
        let _ = self
            .abandoned
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Give up on the call behind `ticket`. Returns `false` if the worker had already claimed
    /// it, in which case nothing stays tainted.
    pub(crate) fn abandon(&self, ticket: &Ticket) -> bool {
        // Taint before abandoning so the worker can never settle a call that was not counted.
        self.taint();
        if ticket.abandon() {
            true
        } else {
            self.settle_abandoned();
            false
        }
    }

    pub(crate) fn is_tainted(&self) -> bool {
        self.abandoned.load(Ordering::Acquire) > 0
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.cancel();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

enum Outcome<T> {
    Replied(Result<Result<T, SqlBridgeError>, oneshot::error::RecvError>),
    Closed,
    Expired,
}

/// One in-flight blocking call.
///
/// Awaiting [`PendingOperation::wait`] races the worker's reply against the connection closing
/// and the optional deadline. Dropping it before a reply arrives cancels delivery and taints
/// the connection until the worker reports the call has returned.
pub(crate) struct PendingOperation<T> {
    ticket: Arc<Ticket>,
    reply: oneshot::Receiver<Result<T, SqlBridgeError>>,
    worker: Arc<WorkerHandle>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    label: &'static str,
    finished: bool,
}

impl<T> PendingOperation<T> {
    pub(crate) fn new(
        ticket: Arc<Ticket>,
        reply: oneshot::Receiver<Result<T, SqlBridgeError>>,
        worker: Arc<WorkerHandle>,
        timeout: Option<Duration>,
        label: &'static str,
    ) -> Self {
        Self {
            ticket,
            reply,
            worker,
            timeout,
            deadline: timeout.map(|limit| Instant::now() + limit),
            label,
            finished: false,
        }
    }

    pub(crate) async fn wait(mut self) -> Result<T, SqlBridgeError> {
        let closed = self.worker.state.closed_token();
        let deadline = self.deadline;
        let outcome = tokio::select! {
            biased;
            reply = &mut self.reply => Outcome::Replied(reply),
            () = closed.cancelled() => Outcome::Closed,
            () = expired(deadline) => Outcome::Expired,
        };
        self.finished = true;

        let id = self.worker.state.id;
        match outcome {
            Outcome::Replied(Ok(result)) => result,
            Outcome::Replied(Err(_)) => Err(SqlBridgeError::connection(format!(
                "worker for connection {id} exited during {}",
                self.label
            ))),
            Outcome::Closed => {
                self.worker.state.abandon(&self.ticket);
                Err(SqlBridgeError::connection(format!(
                    "connection {id} was closed during {}",
                    self.label
                )))
            }
            Outcome::Expired => {
                self.worker.state.abandon(&self.ticket);
                let limit = self.timeout.unwrap_or_default();
                tracing::warn!(
                    connection = id,
                    operation = self.label,
                    timeout_ms = limit.as_millis() as u64,
                    "operation timed out; closing connection"
                );
                self.worker.state.mark_closed();
                self.worker.send_detached(Command::Close { respond_to: None });
                Err(SqlBridgeError::TimeoutError(limit))
            }
        }
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<T> Drop for PendingOperation<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let state = &self.worker.state;
        if state.abandon(&self.ticket) {
            tracing::warn!(
                connection = state.id,
                operation = self.label,
                "operation cancelled before completion"
            );
        }
    }
}
