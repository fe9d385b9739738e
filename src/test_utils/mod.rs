//! Test support: a scripted in-memory driver plus shortcuts for opening connections on it.

mod memory;

pub use memory::{Failure, MemoryCell, MemoryDriver, MemoryResult, RecordedExecution};

use crate::bridge::{Connection, ConnectionFactory};
use crate::config::{ConnectOptions, ConnectionConfiguration};
use crate::error::SqlBridgeError;

/// Configuration for `localhost` with no timeouts.
///
/// # Errors
/// Never fails for these options; the signature mirrors [`crate::config::resolve`].
pub fn local_config() -> Result<ConnectionConfiguration, SqlBridgeError> {
    ConnectOptions::builder().host("localhost").resolve()
}

/// Factory over a clone of `driver` with the local configuration.
///
/// # Errors
/// See [`local_config`].
pub fn memory_factory(driver: &MemoryDriver) -> Result<ConnectionFactory, SqlBridgeError> {
    Ok(ConnectionFactory::new(driver.clone(), local_config()?))
}

/// Open one connection over a clone of `driver`.
///
/// # Errors
/// Whatever the scripted driver raises while connecting.
pub async fn memory_connection(driver: &MemoryDriver) -> Result<Connection, SqlBridgeError> {
    memory_factory(driver)?.create().await
}
