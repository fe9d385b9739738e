//! Runs blocking driver sessions on dedicated worker threads and exposes them as futures and
//! streams.
//!
//! Each [`Connection`] owns one worker thread. Commands are queued over a channel and run
//! strictly in submission order; replies come back over oneshot channels. A caller that stops
//! waiting cannot interrupt the driver call already running, so the connection refuses new
//! work until the worker reports that call has returned. A caller whose deadline passes closes
//! the connection instead.

mod connection;
mod pending;
mod pool;
mod worker;

pub use connection::{Connection, ConnectionFactory};
pub use pool::{DEFAULT_CAPACITY, WorkerPool};
