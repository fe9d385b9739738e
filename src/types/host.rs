use std::fmt;

use bigdecimal::BigDecimal;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SqlBridgeError;
use crate::lob::{Blob, Clob};

use super::interval::Period;
use super::value::RowId;

/// Host-side value representations a column can decode to or a parameter can be bound from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostType {
    String,
    Decimal,
    I64,
    I32,
    F64,
    F32,
    Bool,
    /// Shared immutable byte buffer (`bytes::Bytes`).
    Bytes,
    /// Owned byte vector.
    ByteVec,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    DateTimeTz,
    Period,
    Duration,
    RowId,
    Json,
    Clob,
    Blob,
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A value as seen by the calling program.
///
/// Nulls carry the host type they stand in for, since the SQL type of a bind parameter cannot
/// be inferred from a bare null:
/// ```rust
/// use reactive_sql_bridge::prelude::*;
///
/// let missing = HostValue::Null(HostType::Decimal);
/// assert!(missing.is_null());
/// assert_eq!(missing.host_type(), HostType::Decimal);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null(HostType),
    String(String),
    Decimal(BigDecimal),
    I64(i64),
    I32(i32),
    F64(f64),
    F32(f32),
    Bool(bool),
    Bytes(Bytes),
    ByteVec(Vec<u8>),
    NaiveDate(NaiveDate),
    NaiveTime(NaiveTime),
    NaiveDateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    Period(Period),
    Duration(TimeDelta),
    RowId(RowId),
    Json(JsonValue),
    Clob(Clob),
    Blob(Blob),
}

impl HostValue {
    #[must_use]
    pub fn host_type(&self) -> HostType {
        match self {
            HostValue::Null(host_type) => *host_type,
            HostValue::String(_) => HostType::String,
            HostValue::Decimal(_) => HostType::Decimal,
            HostValue::I64(_) => HostType::I64,
            HostValue::I32(_) => HostType::I32,
            HostValue::F64(_) => HostType::F64,
            HostValue::F32(_) => HostType::F32,
            HostValue::Bool(_) => HostType::Bool,
            HostValue::Bytes(_) => HostType::Bytes,
            HostValue::ByteVec(_) => HostType::ByteVec,
            HostValue::NaiveDate(_) => HostType::NaiveDate,
            HostValue::NaiveTime(_) => HostType::NaiveTime,
            HostValue::NaiveDateTime(_) => HostType::NaiveDateTime,
            HostValue::DateTimeTz(_) => HostType::DateTimeTz,
            HostValue::Period(_) => HostType::Period,
            HostValue::Duration(_) => HostType::Duration,
            HostValue::RowId(_) => HostType::RowId,
            HostValue::Json(_) => HostType::Json,
            HostValue::Clob(_) => HostType::Clob,
            HostValue::Blob(_) => HostType::Blob,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null(_))
    }

    /// Extract a concrete Rust value, treating null as `None`.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UnsupportedConversionError`] when the value holds a different
    /// host type than `T`.
    pub fn into_option<T: FromHostValue>(self) -> Result<Option<T>, SqlBridgeError> {
        if self.is_null() {
            Ok(None)
        } else {
            T::from_host_value(self).map(Some)
        }
    }
}

/// Rust types that can be pulled out of a [`HostValue`].
///
/// Drives [`crate::results::Row::get_as`]: the associated [`HostType`] is requested from the
/// registry and the decoded value is unwrapped into `Self`.
pub trait FromHostValue: Sized {
    const HOST_TYPE: HostType;

    /// # Errors
    /// Returns [`SqlBridgeError::UnsupportedConversionError`] if `value` is not of `HOST_TYPE`.
    fn from_host_value(value: HostValue) -> Result<Self, SqlBridgeError>;
}

macro_rules! host_value_conversions {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl FromHostValue for $ty {
                const HOST_TYPE: HostType = HostType::$variant;

                fn from_host_value(value: HostValue) -> Result<Self, SqlBridgeError> {
                    match value {
                        HostValue::$variant(inner) => Ok(inner),
                        other => Err(SqlBridgeError::unsupported(format!(
                            "expected {} value, found {}",
                            HostType::$variant,
                            other.host_type()
                        ))),
                    }
                }
            }

            impl From<$ty> for HostValue {
                fn from(value: $ty) -> Self {
                    HostValue::$variant(value)
                }
            }
        )*
    };
}

host_value_conversions! {
    String => String,
    Decimal => BigDecimal,
    I64 => i64,
    I32 => i32,
    F64 => f64,
    F32 => f32,
    Bool => bool,
    Bytes => Bytes,
    ByteVec => Vec<u8>,
    NaiveDate => NaiveDate,
    NaiveTime => NaiveTime,
    NaiveDateTime => NaiveDateTime,
    DateTimeTz => DateTime<FixedOffset>,
    Period => Period,
    Duration => TimeDelta,
    RowId => RowId,
    Json => JsonValue,
    Clob => Clob,
    Blob => Blob,
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_owned())
    }
}

impl<T> From<Option<T>> for HostValue
where
    T: FromHostValue + Into<HostValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Null(T::HOST_TYPE), Into::into)
    }
}
