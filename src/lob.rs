//! Large-object streaming: lazy chunk streams over driver locators, caller-supplied chunk
//! streams for binds, and materialization into one contiguous buffer.

mod accumulator;
mod handle;

pub use accumulator::{INITIAL_CAPACITY, LobAccumulator};
pub use handle::{Blob, Clob, LobWriteSource};

pub(crate) use handle::LobContext;

/// Units (bytes or characters) requested from the driver per chunk read.
pub const LOB_CHUNK_SIZE: usize = 32 * 1024;
