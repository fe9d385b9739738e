//! Value model shared by the registry, the statement layer and drivers.
//!
//! [`SqlValue`] is what crosses the driver boundary; [`HostValue`] is what callers bind and
//! read. The registry in [`crate::registry`] converts between the two.

mod host;
mod interval;
mod sql_type;
mod value;

pub use host::{FromHostValue, HostType, HostValue};
pub use interval::{
    Period, format_day_to_second, format_year_to_month, parse_day_to_second,
    parse_year_to_month,
};
pub use sql_type::SqlType;
pub use value::{RowId, SqlValue};
