use std::fmt;

use bigdecimal::BigDecimal;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::driver::LobLocator;

use super::sql_type::SqlType;

/// Opaque row address as returned by the database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowId(String);

impl RowId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value in the driver's representation: what gets bound to a statement and what a fetch
/// hands back for each column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlType),
    Text(String),
    Number(BigDecimal),
    BinaryFloat(f32),
    BinaryDouble(f64),
    Binary(Bytes),
    /// Zone-naive date/time; also carries DATE values.
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    /// Signed month count.
    IntervalYearToMonth(i64),
    IntervalDayToSecond(TimeDelta),
    RowId(String),
    Json(JsonValue),
    /// Server-side large object reference.
    Lob(LobLocator),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Short name of the representation, used in conversion errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null(_) => "null",
            SqlValue::Text(_) => "text",
            SqlValue::Number(_) => "number",
            SqlValue::BinaryFloat(_) => "binary float",
            SqlValue::BinaryDouble(_) => "binary double",
            SqlValue::Binary(_) => "binary",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimestampTz(_) => "timestamp with time zone",
            SqlValue::IntervalYearToMonth(_) => "year-month interval",
            SqlValue::IntervalDayToSecond(_) => "day-second interval",
            SqlValue::RowId(_) => "rowid",
            SqlValue::Json(_) => "json",
            SqlValue::Lob(_) => "lob locator",
        }
    }
}
