use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use num_traits::ToPrimitive;
use rusqlite::types::Value;

use crate::error::SqlBridgeError;
use crate::types::{SqlType, SqlValue};

const TIMESTAMP_FORMAT: &str = "%F %T%.f";
const TIMESTAMP_TZ_FORMAT: &str = "%F %T%.f%:z";

/// Storage class a column without a declared type falls back to.
pub(crate) fn infer_sql_type(decl_type: Option<&str>, sample: Option<&Value>) -> SqlType {
    if let Some(decl) = decl_type {
        if let Some(sql_type) = SqlType::parse(decl) {
            return sql_type;
        }
        // SQLite affinity rules for names we do not know.
        let upper = decl.to_ascii_uppercase();
        return if upper.contains("INT") {
            SqlType::Number
        } else if upper.contains("CHAR") || upper.contains("TEXT") {
            SqlType::Varchar
        } else if upper.contains("BLOB") {
            SqlType::Raw
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            SqlType::BinaryDouble
        } else if upper.contains("DATE") || upper.contains("TIME") {
            SqlType::Timestamp
        } else {
            SqlType::Number
        };
    }
    match sample {
        Some(Value::Integer(_)) => SqlType::Number,
        Some(Value::Real(_)) => SqlType::BinaryDouble,
        Some(Value::Blob(_)) => SqlType::Raw,
        Some(Value::Text(_) | Value::Null) | None => SqlType::Varchar,
    }
}

/// Bind-side conversion. LOB locators are resolved by the session before this is called.
pub(crate) fn to_sqlite(value: &SqlValue) -> Result<Value, SqlBridgeError> {
    Ok(match value {
        SqlValue::Null(_) => Value::Null,
        SqlValue::Text(text) | SqlValue::RowId(text) => Value::Text(text.clone()),
        SqlValue::Number(number) => match number.is_integer().then(|| number.to_i64()).flatten() {
            Some(int) => Value::Integer(int),
            // NUMERIC affinity turns numeric text into REAL; a BLOB is stored as given.
            None if survives_real(number) => Value::Text(number.normalized().to_string()),
            None => Value::Blob(number.normalized().to_string().into_bytes()),
        },
        SqlValue::BinaryFloat(float) => Value::Real(f64::from(*float)),
        SqlValue::BinaryDouble(double) => Value::Real(*double),
        SqlValue::Binary(bytes) => Value::Blob(bytes.to_vec()),
        SqlValue::Timestamp(ts) => Value::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
        SqlValue::TimestampTz(ts) => Value::Text(ts.format(TIMESTAMP_TZ_FORMAT).to_string()),
        SqlValue::IntervalYearToMonth(months) => Value::Integer(*months),
        SqlValue::IntervalDayToSecond(delta) => {
            Value::Integer(delta.num_nanoseconds().ok_or_else(|| {
                SqlBridgeError::unsupported(format!("interval {delta} exceeds nanosecond range"))
            })?)
        }
        SqlValue::Json(json) => Value::Text(json.to_string()),
        SqlValue::Lob(locator) => {
            return Err(SqlBridgeError::ExecutionError(format!(
                "{locator} must be resolved before binding"
            )));
        }
    })
}

fn mismatch(sql_type: SqlType, value: &Value) -> SqlBridgeError {
    let kind = match value {
        Value::Null => "NULL",
        Value::Integer(_) => "INTEGER",
        Value::Real(_) => "REAL",
        Value::Text(_) => "TEXT",
        Value::Blob(_) => "BLOB",
    };
    SqlBridgeError::ExecutionError(format!("{sql_type} column holds a {kind} value"))
}

fn decimal_from_real(real: f64) -> Result<BigDecimal, SqlBridgeError> {
    // Display gives the shortest text that round-trips, so 0.1 stays 0.1.
    BigDecimal::from_str(&real.to_string())
        .map_err(|_| SqlBridgeError::ExecutionError(format!("{real} is not a finite number")))
}

/// Whether `number` reads back unchanged after SQLite stores it as a REAL.
fn survives_real(number: &BigDecimal) -> bool {
    number
        .to_f64()
        .and_then(|real| decimal_from_real(real).ok())
        .is_some_and(|back| back == *number)
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%FT%T%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%F")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn parse_timestamp_tz(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, TIMESTAMP_TZ_FORMAT))
        .ok()
}

/// Fetch-side conversion for every non-LOB SQL type.
pub(crate) fn from_sqlite(value: Value, sql_type: SqlType) -> Result<SqlValue, SqlBridgeError> {
    use SqlType as T;

    if matches!(value, Value::Null) {
        return Ok(SqlValue::Null(sql_type));
    }
    let converted = match (sql_type, &value) {
        (T::Char | T::Varchar | T::NChar | T::NVarchar | T::Long, Value::Text(text)) => {
            SqlValue::Text(text.clone())
        }
        (T::Char | T::Varchar | T::NChar | T::NVarchar | T::Long, Value::Integer(int)) => {
            SqlValue::Text(int.to_string())
        }
        (T::Char | T::Varchar | T::NChar | T::NVarchar | T::Long, Value::Real(real)) => {
            SqlValue::Text(real.to_string())
        }
        (T::Char | T::Varchar | T::NChar | T::NVarchar | T::Long, Value::Blob(bytes)) => {
            SqlValue::Text(String::from_utf8(bytes.clone()).map_err(|_| {
                SqlBridgeError::ExecutionError(format!("{sql_type} column holds non UTF-8 bytes"))
            })?)
        }
        (T::Raw | T::LongRaw, Value::Blob(bytes)) => SqlValue::Binary(bytes.clone().into()),
        (T::Raw | T::LongRaw, Value::Text(text)) => SqlValue::Binary(text.clone().into_bytes().into()),
        (T::Number, Value::Integer(int)) => SqlValue::Number((*int).into()),
        (T::Number, Value::Real(real)) => SqlValue::Number(decimal_from_real(*real)?),
        (T::Number, Value::Text(text)) => SqlValue::Number(
            BigDecimal::from_str(text.trim()).map_err(|_| mismatch(sql_type, &value))?,
        ),
        (T::Number, Value::Blob(bytes)) => SqlValue::Number(
            std::str::from_utf8(bytes)
                .ok()
                .and_then(|text| BigDecimal::from_str(text.trim()).ok())
                .ok_or_else(|| mismatch(sql_type, &value))?,
        ),
        (T::Float | T::BinaryDouble, Value::Real(real)) => SqlValue::BinaryDouble(*real),
        #[allow(clippy::cast_precision_loss)]
        (T::Float | T::BinaryDouble, Value::Integer(int)) => SqlValue::BinaryDouble(*int as f64),
        #[allow(clippy::cast_possible_truncation)]
        (T::BinaryFloat, Value::Real(real)) => SqlValue::BinaryFloat(*real as f32),
        #[allow(clippy::cast_precision_loss)]
        (T::BinaryFloat, Value::Integer(int)) => SqlValue::BinaryFloat(*int as f32),
        (T::Date | T::Timestamp | T::TimestampWithLocalTimeZone, Value::Text(text)) => {
            SqlValue::Timestamp(parse_timestamp(text).ok_or_else(|| mismatch(sql_type, &value))?)
        }
        (T::Date | T::Timestamp | T::TimestampWithLocalTimeZone, Value::Integer(secs)) => {
            SqlValue::Timestamp(
                DateTime::from_timestamp(*secs, 0)
                    .ok_or_else(|| mismatch(sql_type, &value))?
                    .naive_utc(),
            )
        }
        (T::TimestampWithTimeZone, Value::Text(text)) => SqlValue::TimestampTz(
            parse_timestamp_tz(text).ok_or_else(|| mismatch(sql_type, &value))?,
        ),
        (T::IntervalYearToMonth, Value::Integer(months)) => SqlValue::IntervalYearToMonth(*months),
        (T::IntervalDayToSecond, Value::Integer(nanos)) => {
            SqlValue::IntervalDayToSecond(TimeDelta::nanoseconds(*nanos))
        }
        (T::RowId | T::URowId, Value::Text(text)) => SqlValue::RowId(text.clone()),
        (T::RowId | T::URowId, Value::Integer(int)) => SqlValue::RowId(int.to_string()),
        (T::Json, Value::Text(text)) => SqlValue::Json(
            serde_json::from_str(text).map_err(|err| {
                SqlBridgeError::ExecutionError(format!("JSON column holds invalid text: {err}"))
            })?,
        ),
        _ => return Err(mismatch(sql_type, &value)),
    };
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undeclared_columns_follow_their_sample() {
        assert_eq!(infer_sql_type(None, Some(&Value::Integer(1))), SqlType::Number);
        assert_eq!(infer_sql_type(None, Some(&Value::Real(1.5))), SqlType::BinaryDouble);
        assert_eq!(infer_sql_type(None, None), SqlType::Varchar);
        assert_eq!(infer_sql_type(Some("VARCHAR(20)"), None), SqlType::Varchar);
        assert_eq!(infer_sql_type(Some("BIGINT"), None), SqlType::Number);
        assert_eq!(infer_sql_type(Some("DATETIME"), None), SqlType::Timestamp);
    }

    #[test]
    fn short_decimals_bind_as_text() {
        let value = SqlValue::Number(BigDecimal::from_str("12.3400").unwrap());
        assert_eq!(to_sqlite(&value).unwrap(), Value::Text("12.34".into()));
        let value = SqlValue::Number(42.into());
        assert_eq!(to_sqlite(&value).unwrap(), Value::Integer(42));
    }

    #[test]
    fn long_decimals_bind_as_blobs_and_read_back_whole() {
        let digits = "3.14159265358979323846264338327950288419";
        let value = SqlValue::Number(BigDecimal::from_str(digits).unwrap());
        let stored = to_sqlite(&value).unwrap();
        assert!(matches!(stored, Value::Blob(_)));
        assert_eq!(from_sqlite(stored, SqlType::Number).unwrap(), value);

        let huge = SqlValue::Number(BigDecimal::from_str("123456789012345678901234567890").unwrap());
        assert!(matches!(to_sqlite(&huge).unwrap(), Value::Blob(_)));
    }

    #[test]
    fn reals_decode_to_their_shortest_decimal() {
        let decoded = from_sqlite(Value::Real(0.1), SqlType::Number).unwrap();
        assert_eq!(decoded, SqlValue::Number(BigDecimal::from_str("0.1").unwrap()));
    }

    #[test]
    fn timestamps_survive_text_storage() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(13, 14, 15, 250_000)
            .unwrap();
        let Value::Text(text) = to_sqlite(&SqlValue::Timestamp(ts)).unwrap() else {
            panic!("timestamps bind as text");
        };
        assert_eq!(
            from_sqlite(Value::Text(text), SqlType::Timestamp).unwrap(),
            SqlValue::Timestamp(ts)
        );
    }

    #[test]
    fn mismatched_storage_is_an_execution_error() {
        let err = from_sqlite(Value::Blob(vec![1]), SqlType::Number).unwrap_err();
        assert!(matches!(err, SqlBridgeError::ExecutionError(_)));
    }
}
