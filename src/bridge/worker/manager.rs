use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, oneshot};

use crate::config::ConnectionConfiguration;
use crate::driver::Driver;
use crate::error::SqlBridgeError;

use super::super::pending::{ConnectionState, PendingOperation, Ticket};
use super::channel::{Command, Job, Reply};
use super::dispatcher::run_worker;

/// Caller-side handle to a connection's worker thread.
pub(crate) struct WorkerHandle {
    sender: Sender<Job>,
    pub(crate) state: Arc<ConnectionState>,
}

impl WorkerHandle {
    /// Spawn the worker thread and open the driver session on it.
    ///
    /// The pool permit moves into the thread and is released when the thread exits, whether
    /// the session opened, failed, or the caller stopped waiting for it.
    pub(crate) async fn spawn(
        driver: Arc<dyn Driver>,
        config: ConnectionConfiguration,
        permit: OwnedSemaphorePermit,
        id: u64,
    ) -> Result<Self, SqlBridgeError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), SqlBridgeError>>();
        let state = Arc::new(ConnectionState::new(id));
        let worker_state = Arc::clone(&state);
        let connect_timeout = config.connect_timeout;
        let handle = Handle::try_current().ok();
        let name = driver.name();

        thread::Builder::new()
            .name(format!("{name}-worker-{id}"))
            .spawn(move || {
                let runtime_guard = handle.as_ref().map(|h| h.enter());
                let _permit = permit;
                match driver.connect(&config) {
                    Ok(mut session) => {
                        if ready_tx.send(Ok(())).is_err() {
                            // Nobody is waiting for this session any more.
                            worker_state.mark_closed();
                            let _ = session.close();
                        } else {
                            run_worker(session, &receiver, &worker_state);
                        }
                    }
                    Err(err) => {
                        worker_state.mark_closed();
                        let _ = ready_tx.send(Err(err));
                    }
                }
                drop(runtime_guard);
            })
            .map_err(|err| {
                SqlBridgeError::connection(format!("failed to spawn {name} worker thread: {err}"))
            })?;

        let connected = async {
            ready_rx.await.map_err(|_| {
                SqlBridgeError::connection(format!("{name} worker exited while connecting"))
            })?
        };
        let outcome = match connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, connected).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    state.mark_closed();
                    tracing::warn!(
                        connection = id,
                        driver = name,
                        timeout_ms = limit.as_millis() as u64,
                        "connect timed out"
                    );
                    Err(SqlBridgeError::TimeoutError(limit))
                }
            },
            None => connected.await,
        };
        outcome?;
        tracing::debug!(connection = id, driver = name, "connection opened");
        Ok(Self { sender, state })
    }

    pub(crate) fn send(&self, job: Job) -> Result<(), SqlBridgeError> {
        self.sender.send(job).map_err(|_| {
            self.state.mark_closed();
            SqlBridgeError::connection(format!("worker for connection {} is gone", self.state.id))
        })
    }

    /// Queue cleanup nobody waits for. Failures are only logged by the worker.
    pub(crate) fn send_detached(&self, command: Command) {
        let _ = self.sender.send(Job {
            ticket: None,
            command,
        });
    }

    /// Queue a command behind everything already submitted and hand back its pending reply.
    pub(crate) fn dispatch<T>(
        self: &Arc<Self>,
        build: impl FnOnce(Reply<T>) -> Command,
        timeout: Option<Duration>,
    ) -> Result<PendingOperation<T>, SqlBridgeError> {
        self.state.check_usable()?;
        let (tx, rx) = oneshot::channel();
        let ticket = Arc::new(Ticket::default());
        let command = build(tx);
        let label = command.label();
        self.send(Job {
            ticket: Some(Arc::clone(&ticket)),
            command,
        })?;
        Ok(PendingOperation::new(
            ticket,
            rx,
            Arc::clone(self),
            timeout,
            label,
        ))
    }

    /// Queue a close behind in-flight work and wait for the worker to run it. Not gated on
    /// taint: a connection waiting on a cancelled call can still be closed.
    pub(crate) async fn close(&self) {
        if self.state.is_closed() {
            return;
        }
        let (tx, rx) = oneshot::channel();
        let queued = self.send(Job {
            ticket: None,
            command: Command::Close {
                respond_to: Some(tx),
            },
        });
        if queued.is_ok() {
            // A worker that exits first has closed its session already.
            let _ = rx.await;
        }
        self.state.mark_closed();
    }

    pub(crate) async fn request<T>(
        self: &Arc<Self>,
        build: impl FnOnce(Reply<T>) -> Command,
        timeout: Option<Duration>,
    ) -> Result<T, SqlBridgeError> {
        self.dispatch(build, timeout)?.wait().await
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.sender.send(Job {
            ticket: None,
            command: Command::Shutdown,
        });
    }
}
