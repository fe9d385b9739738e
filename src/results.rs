//! Query results: rows decoded through the type registry, delivered as a pull-based stream.

mod row;
mod stream;

pub use row::{ColumnIndex, ColumnSet, Row};
pub use stream::RowStream;
