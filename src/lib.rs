//! Async bridge over blocking SQL drivers.
//!
//! Every connection owns a dedicated worker thread that runs the blocking driver session one
//! call at a time; callers get futures and streams that can be cancelled or given deadlines.
//! Values cross the driver boundary through an immutable [`registry::TypeRegistry`], large
//! objects are streamed in chunks, and connection settings are resolved from inline options,
//! a URL and `tnsnames.ora` / `ojdbc.properties` files.
//!
//! ```rust,no_run
//! use reactive_sql_bridge::prelude::*;
//! use reactive_sql_bridge::sqlite::SqliteDriver;
//!
//! # async fn demo() -> Result<(), SqlBridgeError> {
//! let config = ConnectOptions::builder().host("localhost").resolve()?;
//! let factory = SqliteDriver::builder(":memory:")
//!     .init_sql("CREATE TABLE people (id INTEGER, name VARCHAR(40));")
//!     .build(config);
//! let conn = factory.create().await?;
//!
//! let mut insert = conn.create_statement("INSERT INTO people VALUES (:id, :name)");
//! insert.bind(":id", 1_i64)?.bind(":name", "Ada")?;
//! insert.execute().await?;
//!
//! let mut rows = conn
//!     .create_statement("SELECT name FROM people")
//!     .execute()
//!     .await?
//!     .into_rows()?;
//! while let Some(row) = rows.next().await {
//!     let name: Option<String> = row?.get_as("name")?;
//!     println!("{name:?}");
//! }
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod driver;
pub mod error;
pub mod lob;
pub mod prelude;
pub mod registry;
pub mod results;
pub mod statement;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use bridge::{Connection, ConnectionFactory, WorkerPool};
pub use config::{ConnectOptions, ConnectionConfiguration};
pub use error::{ConfigError, SqlBridgeError};
pub use registry::TypeRegistry;
