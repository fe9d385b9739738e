//! Bidirectional conversion between [`SqlValue`] and [`HostValue`].
//!
//! Each SQL type has exactly one [`TypeMapping`]: the host type a column decodes to when the
//! caller does not ask for one, the extra host types it may be asked for, and the host types
//! accepted when binding. The process-wide registry is built once and never mutated.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::error::SqlBridgeError;
use crate::lob::{LobContext, LobWriteSource};
use crate::types::{HostType, HostValue, SqlType, SqlValue};

mod codecs;

pub(crate) type EncodeFn = fn(HostValue, SqlType) -> Result<BindValue, SqlBridgeError>;
pub(crate) type DecodeFn = fn(SqlValue, &DecodeRequest<'_>) -> Result<HostValue, SqlBridgeError>;

/// Where a decode is headed and what it may borrow from the current row.
pub(crate) struct DecodeRequest<'a> {
    pub(crate) sql_type: SqlType,
    pub(crate) target: HostType,
    pub(crate) lob: Option<&'a LobContext>,
}

/// A bind parameter after encoding: either a plain driver value or LOB content that must be
/// uploaded into a temporary LOB before the statement runs.
#[derive(Debug)]
pub enum BindValue {
    Value(SqlValue),
    Lob(LobWriteSource),
}

#[derive(Clone, Copy)]
pub struct TypeMapping {
    pub sql_type: SqlType,
    pub default_host: HostType,
    pub also_decodes_to: &'static [HostType],
    pub encodes_from: &'static [HostType],
    pub(crate) encode: EncodeFn,
    pub(crate) decode: DecodeFn,
}

impl TypeMapping {
    #[must_use]
    pub fn decodes_to(&self, host: HostType) -> bool {
        host == self.default_host || self.also_decodes_to.contains(&host)
    }

    #[must_use]
    pub fn encodes(&self, host: HostType) -> bool {
        self.encodes_from.contains(&host)
    }
}

impl fmt::Debug for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMapping")
            .field("sql_type", &self.sql_type)
            .field("default_host", &self.default_host)
            .field("also_decodes_to", &self.also_decodes_to)
            .field("encodes_from", &self.encodes_from)
            .finish_non_exhaustive()
    }
}

static GLOBAL: LazyLock<Arc<TypeRegistry>> = LazyLock::new(|| Arc::new(TypeRegistry::standard()));

/// Immutable table of [`TypeMapping`]s keyed by SQL type.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    mappings: HashMap<SqlType, TypeMapping>,
}

impl TypeRegistry {
    /// The shared process-wide registry.
    #[must_use]
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL
    }

    /// Shared handle to [`TypeRegistry::global`].
    #[must_use]
    pub fn shared() -> Arc<TypeRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// A registry holding the built-in mapping for every [`SqlType`].
    #[must_use]
    pub fn standard() -> Self {
        Self::from_mappings(codecs::standard_mappings())
    }

    /// Build a registry from explicit mappings. A later mapping for the same SQL type replaces
    /// an earlier one.
    #[must_use]
    pub fn from_mappings(mappings: impl IntoIterator<Item = TypeMapping>) -> Self {
        Self {
            mappings: mappings
                .into_iter()
                .map(|mapping| (mapping.sql_type, mapping))
                .collect(),
        }
    }

    #[must_use]
    pub fn mapping(&self, sql_type: SqlType) -> Option<&TypeMapping> {
        self.mappings.get(&sql_type)
    }

    /// SQL type a host value binds as when the caller does not name one.
    ///
    /// `bool` and `NaiveTime` have none: booleans only become 0/1 `NUMBER`s when bound with
    /// an explicit type.
    #[must_use]
    pub fn default_sql_type(host: HostType) -> Option<SqlType> {
        Some(match host {
            HostType::String => SqlType::Varchar,
            HostType::Decimal | HostType::I64 | HostType::I32 => SqlType::Number,
            HostType::F64 => SqlType::BinaryDouble,
            HostType::F32 => SqlType::BinaryFloat,
            HostType::Bytes | HostType::ByteVec => SqlType::Raw,
            HostType::NaiveDate => SqlType::Date,
            HostType::NaiveDateTime => SqlType::Timestamp,
            HostType::DateTimeTz => SqlType::TimestampWithTimeZone,
            HostType::Period => SqlType::IntervalYearToMonth,
            HostType::Duration => SqlType::IntervalDayToSecond,
            HostType::RowId => SqlType::RowId,
            HostType::Json => SqlType::Json,
            HostType::Clob => SqlType::Clob,
            HostType::Blob => SqlType::Blob,
            HostType::Bool | HostType::NaiveTime => return None,
        })
    }

    fn require(&self, sql_type: SqlType) -> Result<&TypeMapping, SqlBridgeError> {
        self.mapping(sql_type).ok_or_else(|| {
            SqlBridgeError::unsupported(format!("no mapping registered for {sql_type}"))
        })
    }

    /// Encode a host value for binding as `sql_type`, or as the host type's default SQL type.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UnsupportedConversionError`] if the host type cannot be bound
    /// as the SQL type, or the value does not fit it.
    pub fn encode(
        &self,
        value: HostValue,
        sql_type: Option<SqlType>,
    ) -> Result<BindValue, SqlBridgeError> {
        let host = value.host_type();
        let sql_type = match sql_type {
            Some(sql_type) => sql_type,
            None => Self::default_sql_type(host).ok_or_else(|| {
                SqlBridgeError::unsupported(format!(
                    "{host} has no default SQL type; bind it with an explicit type"
                ))
            })?,
        };
        let mapping = self.require(sql_type)?;
        if !mapping.encodes(host) {
            return Err(SqlBridgeError::unsupported(format!(
                "{host} cannot be bound as {sql_type}"
            )));
        }
        if value.is_null() {
            return Ok(BindValue::Value(SqlValue::Null(sql_type)));
        }
        (mapping.encode)(value, sql_type)
    }

    /// [`TypeRegistry::encode`] for values that never need a LOB upload.
    ///
    /// # Errors
    /// As [`TypeRegistry::encode`], plus [`SqlBridgeError::UnsupportedConversionError`] when the
    /// value is LOB content.
    pub fn encode_value(
        &self,
        value: HostValue,
        sql_type: Option<SqlType>,
    ) -> Result<SqlValue, SqlBridgeError> {
        match self.encode(value, sql_type)? {
            BindValue::Value(value) => Ok(value),
            BindValue::Lob(source) => Err(SqlBridgeError::unsupported(format!(
                "{:?} content must be bound to a statement",
                source.kind()
            ))),
        }
    }

    /// Decode a column value of `sql_type` into `requested`, or the mapping's default host type.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::UnsupportedConversionError`] if no converter exists for the
    /// requested pair or the value does not fit the host type.
    pub fn decode(
        &self,
        value: SqlValue,
        sql_type: SqlType,
        requested: Option<HostType>,
    ) -> Result<HostValue, SqlBridgeError> {
        self.decode_with(value, sql_type, requested, None)
    }

    pub(crate) fn decode_with(
        &self,
        value: SqlValue,
        sql_type: SqlType,
        requested: Option<HostType>,
        lob: Option<&LobContext>,
    ) -> Result<HostValue, SqlBridgeError> {
        let mapping = self.require(sql_type)?;
        let target = match requested {
            None => mapping.default_host,
            Some(host) if mapping.decodes_to(host) => host,
            Some(host) => {
                return Err(SqlBridgeError::unsupported(format!(
                    "{sql_type} cannot be read as {host}"
                )));
            }
        };
        if value.is_null() {
            return Ok(HostValue::Null(target));
        }
        (mapping.decode)(
            value,
            &DecodeRequest {
                sql_type,
                target,
                lob,
            },
        )
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, TimeDelta};

    use super::*;
    use crate::types::Period;

    fn registry() -> &'static TypeRegistry {
        TypeRegistry::global()
    }

    #[test]
    fn every_sql_type_has_a_mapping() {
        for sql_type in SqlType::ALL {
            assert!(registry().mapping(sql_type).is_some(), "{sql_type}");
        }
    }

    #[test]
    fn typed_nulls_survive_both_directions() {
        for sql_type in SqlType::ALL {
            let mapping = registry().mapping(sql_type).unwrap();
            for &host in mapping.encodes_from {
                let encoded = registry()
                    .encode_value(HostValue::Null(host), Some(sql_type))
                    .unwrap();
                assert_eq!(encoded, SqlValue::Null(sql_type));
            }
            let decoded = registry()
                .decode(SqlValue::Null(sql_type), sql_type, None)
                .unwrap();
            assert_eq!(decoded, HostValue::Null(mapping.default_host));
        }
    }

    #[test]
    fn booleans_are_explicit_zero_or_one() {
        let one = SqlValue::Number(BigDecimal::from(1));
        assert_eq!(
            registry()
                .decode(one.clone(), SqlType::Number, Some(HostType::Bool))
                .unwrap(),
            HostValue::Bool(true)
        );
        assert_eq!(
            registry().decode(one, SqlType::Number, None).unwrap(),
            HostValue::Decimal(BigDecimal::from(1))
        );
        let err = registry()
            .decode(
                SqlValue::Number(BigDecimal::from(2)),
                SqlType::Number,
                Some(HostType::Bool),
            )
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::UnsupportedConversionError(_)));
        assert_eq!(
            registry()
                .encode_value(HostValue::Bool(false), Some(SqlType::Number))
                .unwrap(),
            SqlValue::Number(BigDecimal::from(0))
        );
    }

    #[test]
    fn booleans_have_no_default_bind_type() {
        assert_eq!(TypeRegistry::default_sql_type(HostType::Bool), None);
        let err = registry()
            .encode_value(HostValue::Bool(true), None)
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::UnsupportedConversionError(ref m) if m.contains("explicit")));
    }

    #[test]
    fn decimals_keep_their_precision() {
        let digits = BigDecimal::from_str("12345678901234567890.123456789012345678").unwrap();
        let encoded = registry()
            .encode_value(HostValue::Decimal(digits.clone()), None)
            .unwrap();
        let decoded = registry().decode(encoded, SqlType::Number, None).unwrap();
        assert_eq!(decoded, HostValue::Decimal(digits));
    }

    #[test]
    fn year_month_intervals_reject_days() {
        let err = registry()
            .encode_value(HostValue::Period(Period::new(1, 2, 3)), None)
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::UnsupportedConversionError(_)));

        let err = registry()
            .encode_value(
                HostValue::Duration(TimeDelta::days(3)),
                Some(SqlType::IntervalYearToMonth),
            )
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::UnsupportedConversionError(_)));
    }

    #[test]
    fn unregistered_requests_are_refused() {
        let err = registry()
            .decode(
                SqlValue::Text("x".into()),
                SqlType::Varchar,
                Some(HostType::I64),
            )
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::UnsupportedConversionError(_)));

        let time = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(1, 2, 3)
            .unwrap()
            .time();
        let err = registry()
            .encode_value(HostValue::NaiveTime(time), None)
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::UnsupportedConversionError(_)));
    }

    #[test]
    fn lob_locators_need_a_row() {
        use crate::driver::{LobKind, LobLocator};
        let locator = SqlValue::Lob(LobLocator {
            id: 1,
            kind: LobKind::Blob,
        });
        let err = registry().decode(locator, SqlType::Blob, None).unwrap_err();
        assert!(matches!(err, SqlBridgeError::StaleResourceError(_)));
    }

    #[test]
    fn explicit_registries_override_by_sql_type() {
        let mut custom = *TypeRegistry::standard().mapping(SqlType::Number).unwrap();
        custom.also_decodes_to = &[];
        let registry =
            TypeRegistry::from_mappings(codecs::standard_mappings().into_iter().chain([custom]));
        let err = registry
            .decode(
                SqlValue::Number(BigDecimal::from(1)),
                SqlType::Number,
                Some(HostType::Bool),
            )
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::UnsupportedConversionError(_)));
    }
}
