// SQLite driver - a blocking `DriverSession` over rusqlite
//
// - config: options, builder and the `Driver` that opens sessions
// - params: value conversion between bridge and SQLite storage classes
// - session: cursors, LOB values and statement execution

pub mod config;
mod params;
mod session;

pub use config::{SqliteDriver, SqliteOptions, SqliteOptionsBuilder};
