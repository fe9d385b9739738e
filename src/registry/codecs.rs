use bigdecimal::BigDecimal;
use chrono::{NaiveTime, SubsecRound};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::driver::LobKind;
use crate::error::SqlBridgeError;
use crate::lob::{Blob, Clob, LobContext};
use crate::types::HostType as H;
use crate::types::{HostType, HostValue, Period, RowId, SqlType, SqlValue};

use super::{BindValue, DecodeFn, DecodeRequest, EncodeFn, TypeMapping};

fn mapping(
    sql_type: SqlType,
    default_host: HostType,
    also_decodes_to: &'static [HostType],
    encodes_from: &'static [HostType],
    encode: EncodeFn,
    decode: DecodeFn,
) -> TypeMapping {
    TypeMapping {
        sql_type,
        default_host,
        also_decodes_to,
        encodes_from,
        encode,
        decode,
    }
}

pub(super) fn standard_mappings() -> Vec<TypeMapping> {
    let mut mappings = Vec::with_capacity(SqlType::ALL.len());
    for sql_type in [
        SqlType::Char,
        SqlType::Varchar,
        SqlType::NChar,
        SqlType::NVarchar,
        SqlType::Long,
    ] {
        mappings.push(mapping(
            sql_type,
            H::String,
            &[],
            &[H::String],
            encode_character,
            decode_character,
        ));
    }
    for sql_type in [SqlType::Clob, SqlType::NClob] {
        mappings.push(mapping(
            sql_type,
            H::Clob,
            &[],
            &[H::String, H::Clob],
            encode_clob,
            decode_clob,
        ));
    }
    for sql_type in [SqlType::Raw, SqlType::LongRaw] {
        mappings.push(mapping(
            sql_type,
            H::Bytes,
            &[H::ByteVec],
            &[H::Bytes, H::ByteVec],
            encode_binary,
            decode_binary,
        ));
    }
    mappings.push(mapping(
        SqlType::Blob,
        H::Blob,
        &[],
        &[H::Bytes, H::ByteVec, H::Blob],
        encode_blob,
        decode_blob,
    ));
    mappings.push(mapping(
        SqlType::Number,
        H::Decimal,
        &[H::I64, H::I32, H::F64, H::F32, H::Bool, H::String],
        &[H::Decimal, H::I64, H::I32, H::F64, H::F32, H::Bool],
        encode_number,
        decode_number,
    ));
    for sql_type in [SqlType::Float, SqlType::BinaryDouble] {
        mappings.push(mapping(
            sql_type,
            H::F64,
            &[H::Decimal, H::F32],
            &[H::F64, H::F32, H::Decimal],
            encode_double,
            decode_double,
        ));
    }
    mappings.push(mapping(
        SqlType::BinaryFloat,
        H::F32,
        &[H::F64, H::Decimal],
        &[H::F32, H::F64],
        encode_float,
        decode_float,
    ));
    mappings.push(mapping(
        SqlType::Date,
        H::NaiveDateTime,
        &[H::NaiveDate],
        &[H::NaiveDateTime, H::NaiveDate],
        encode_date,
        decode_date,
    ));
    for sql_type in [SqlType::Timestamp, SqlType::TimestampWithLocalTimeZone] {
        mappings.push(mapping(
            sql_type,
            H::NaiveDateTime,
            &[H::NaiveDate, H::NaiveTime],
            &[H::NaiveDateTime],
            encode_date,
            decode_timestamp,
        ));
    }
    mappings.push(mapping(
        SqlType::TimestampWithTimeZone,
        H::DateTimeTz,
        &[H::NaiveDateTime],
        &[H::DateTimeTz],
        encode_timestamp_tz,
        decode_timestamp_tz,
    ));
    mappings.push(mapping(
        SqlType::IntervalYearToMonth,
        H::Period,
        &[],
        &[H::Period],
        encode_year_to_month,
        decode_year_to_month,
    ));
    mappings.push(mapping(
        SqlType::IntervalDayToSecond,
        H::Duration,
        &[],
        &[H::Duration],
        encode_day_to_second,
        decode_day_to_second,
    ));
    for sql_type in [SqlType::RowId, SqlType::URowId] {
        mappings.push(mapping(
            sql_type,
            H::RowId,
            &[H::String],
            &[H::RowId],
            encode_row_id,
            decode_row_id,
        ));
    }
    mappings.push(mapping(
        SqlType::Json,
        H::Json,
        &[H::String],
        &[H::Json, H::String],
        encode_json,
        decode_json,
    ));
    mappings
}

fn refuse(value: &HostValue, sql_type: SqlType) -> SqlBridgeError {
    SqlBridgeError::unsupported(format!(
        "{} cannot be bound as {sql_type}",
        value.host_type()
    ))
}

fn mismatch(value: &SqlValue, request: &DecodeRequest<'_>) -> SqlBridgeError {
    SqlBridgeError::unsupported(format!(
        "{} column holds a {} value, which cannot be read as {}",
        request.sql_type,
        value.kind(),
        request.target
    ))
}

fn out_of_range(value: &impl std::fmt::Display, request: &DecodeRequest<'_>) -> SqlBridgeError {
    SqlBridgeError::unsupported(format!(
        "{} value {value} does not fit {}",
        request.sql_type, request.target
    ))
}

fn plain(value: SqlValue) -> Result<BindValue, SqlBridgeError> {
    Ok(BindValue::Value(value))
}

fn encode_character(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::String(text) => plain(SqlValue::Text(text)),
        other => Err(refuse(&other, sql_type)),
    }
}

fn decode_character(
    value: SqlValue,
    request: &DecodeRequest<'_>,
) -> Result<HostValue, SqlBridgeError> {
    match value {
        SqlValue::Text(text) => Ok(HostValue::String(text)),
        other => Err(mismatch(&other, request)),
    }
}

fn encode_clob(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::String(text) => plain(SqlValue::Text(text)),
        HostValue::Clob(clob) => Ok(BindValue::Lob(clob.into_write_source()?)),
        other => Err(refuse(&other, sql_type)),
    }
}

fn lob_context<'a>(
    request: &DecodeRequest<'a>,
) -> Result<&'a LobContext, SqlBridgeError> {
    request.lob.ok_or_else(|| {
        SqlBridgeError::stale(format!(
            "{} locator can only be read from the row that returned it",
            request.sql_type
        ))
    })
}

fn decode_clob(value: SqlValue, request: &DecodeRequest<'_>) -> Result<HostValue, SqlBridgeError> {
    match value {
        SqlValue::Text(text) => Ok(HostValue::Clob(Clob::from_text(text))),
        SqlValue::Lob(locator) if locator.kind == LobKind::Clob => Ok(
            HostValue::Clob(Clob::from_locator(locator, lob_context(request)?.clone())),
        ),
        other => Err(mismatch(&other, request)),
    }
}

fn encode_binary(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::Bytes(bytes) => plain(SqlValue::Binary(bytes)),
        HostValue::ByteVec(bytes) => plain(SqlValue::Binary(bytes.into())),
        other => Err(refuse(&other, sql_type)),
    }
}

fn decode_binary(
    value: SqlValue,
    request: &DecodeRequest<'_>,
) -> Result<HostValue, SqlBridgeError> {
    match (value, request.target) {
        (SqlValue::Binary(bytes), H::ByteVec) => Ok(HostValue::ByteVec(bytes.to_vec())),
        (SqlValue::Binary(bytes), _) => Ok(HostValue::Bytes(bytes)),
        (other, _) => Err(mismatch(&other, request)),
    }
}

fn encode_blob(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::Blob(blob) => Ok(BindValue::Lob(blob.into_write_source()?)),
        other => encode_binary(other, sql_type),
    }
}

fn decode_blob(value: SqlValue, request: &DecodeRequest<'_>) -> Result<HostValue, SqlBridgeError> {
    match value {
        SqlValue::Binary(bytes) => Ok(HostValue::Blob(Blob::from_bytes(bytes))),
        SqlValue::Lob(locator) if locator.kind == LobKind::Blob => Ok(
            HostValue::Blob(Blob::from_locator(locator, lob_context(request)?.clone())),
        ),
        other => Err(mismatch(&other, request)),
    }
}

fn encode_number(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    let number = match value {
        HostValue::Decimal(number) => number,
        HostValue::I64(n) => BigDecimal::from(n),
        HostValue::I32(n) => BigDecimal::from(n),
        HostValue::Bool(flag) => BigDecimal::from(u8::from(flag)),
        HostValue::F64(n) => BigDecimal::from_f64(n)
            .ok_or_else(|| SqlBridgeError::unsupported(format!("{n} is not a finite NUMBER")))?,
        HostValue::F32(n) => BigDecimal::from_f32(n)
            .ok_or_else(|| SqlBridgeError::unsupported(format!("{n} is not a finite NUMBER")))?,
        other => return Err(refuse(&other, sql_type)),
    };
    plain(SqlValue::Number(number))
}

fn as_decimal(value: SqlValue, request: &DecodeRequest<'_>) -> Result<BigDecimal, SqlBridgeError> {
    match value {
        SqlValue::Number(number) => Ok(number),
        SqlValue::BinaryDouble(n) => {
            BigDecimal::from_f64(n).ok_or_else(|| out_of_range(&n, request))
        }
        SqlValue::BinaryFloat(n) => {
            BigDecimal::from_f32(n).ok_or_else(|| out_of_range(&n, request))
        }
        SqlValue::Text(ref text) => text
            .trim()
            .parse::<BigDecimal>()
            .map_err(|_| mismatch(&value, request)),
        other => Err(mismatch(&other, request)),
    }
}

fn decode_number(
    value: SqlValue,
    request: &DecodeRequest<'_>,
) -> Result<HostValue, SqlBridgeError> {
    let number = as_decimal(value, request)?;
    let integral = || {
        if number.is_integer() {
            Ok(())
        } else {
            Err(out_of_range(&number, request))
        }
    };
    match request.target {
        H::I64 => {
            integral()?;
            number
                .to_i64()
                .map(HostValue::I64)
                .ok_or_else(|| out_of_range(&number, request))
        }
        H::I32 => {
            integral()?;
            number
                .to_i32()
                .map(HostValue::I32)
                .ok_or_else(|| out_of_range(&number, request))
        }
        H::F64 => number
            .to_f64()
            .map(HostValue::F64)
            .ok_or_else(|| out_of_range(&number, request)),
        H::F32 => number
            .to_f32()
            .map(HostValue::F32)
            .ok_or_else(|| out_of_range(&number, request)),
        H::Bool => {
            if number == BigDecimal::from(1) {
                Ok(HostValue::Bool(true))
            } else if number == BigDecimal::from(0) {
                Ok(HostValue::Bool(false))
            } else {
                Err(SqlBridgeError::unsupported(format!(
                    "NUMBER {number} is not a boolean; only 0 and 1 are"
                )))
            }
        }
        H::String => Ok(HostValue::String(number.to_string())),
        _ => Ok(HostValue::Decimal(number)),
    }
}

fn encode_double(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    let n = match value {
        HostValue::F64(n) => n,
        HostValue::F32(n) => f64::from(n),
        HostValue::Decimal(ref number) => number
            .to_f64()
            .ok_or_else(|| refuse(&value, sql_type))?,
        other => return Err(refuse(&other, sql_type)),
    };
    plain(SqlValue::BinaryDouble(n))
}

fn decode_double(
    value: SqlValue,
    request: &DecodeRequest<'_>,
) -> Result<HostValue, SqlBridgeError> {
    let n = match value {
        SqlValue::BinaryDouble(n) => n,
        SqlValue::BinaryFloat(n) => f64::from(n),
        SqlValue::Number(ref number) => number.to_f64().ok_or_else(|| mismatch(&value, request))?,
        other => return Err(mismatch(&other, request)),
    };
    match request.target {
        H::F32 => Ok(HostValue::F32(n as f32)),
        H::Decimal => BigDecimal::from_f64(n)
            .map(HostValue::Decimal)
            .ok_or_else(|| out_of_range(&n, request)),
        _ => Ok(HostValue::F64(n)),
    }
}

fn encode_float(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::F32(n) => plain(SqlValue::BinaryFloat(n)),
        HostValue::F64(n) => plain(SqlValue::BinaryFloat(n as f32)),
        other => Err(refuse(&other, sql_type)),
    }
}

fn decode_float(value: SqlValue, request: &DecodeRequest<'_>) -> Result<HostValue, SqlBridgeError> {
    let n = match value {
        SqlValue::BinaryFloat(n) => n,
        SqlValue::BinaryDouble(n) => n as f32,
        SqlValue::Number(ref number) => number.to_f32().ok_or_else(|| mismatch(&value, request))?,
        other => return Err(mismatch(&other, request)),
    };
    match request.target {
        H::F64 => Ok(HostValue::F64(f64::from(n))),
        H::Decimal => BigDecimal::from_f32(n)
            .map(HostValue::Decimal)
            .ok_or_else(|| out_of_range(&n, request)),
        _ => Ok(HostValue::F32(n)),
    }
}

fn encode_date(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::NaiveDateTime(at) => plain(SqlValue::Timestamp(at)),
        HostValue::NaiveDate(day) => plain(SqlValue::Timestamp(day.and_time(NaiveTime::MIN))),
        other => Err(refuse(&other, sql_type)),
    }
}

/// DATE has whole-second precision; fractional seconds are truncated, never rounded.
fn decode_date(value: SqlValue, request: &DecodeRequest<'_>) -> Result<HostValue, SqlBridgeError> {
    match value {
        SqlValue::Timestamp(at) => {
            let at = at.trunc_subsecs(0);
            Ok(match request.target {
                H::NaiveDate => HostValue::NaiveDate(at.date()),
                _ => HostValue::NaiveDateTime(at),
            })
        }
        other => Err(mismatch(&other, request)),
    }
}

fn decode_timestamp(
    value: SqlValue,
    request: &DecodeRequest<'_>,
) -> Result<HostValue, SqlBridgeError> {
    match value {
        SqlValue::Timestamp(at) => Ok(match request.target {
            H::NaiveDate => HostValue::NaiveDate(at.date()),
            H::NaiveTime => HostValue::NaiveTime(at.time()),
            _ => HostValue::NaiveDateTime(at),
        }),
        other => Err(mismatch(&other, request)),
    }
}

fn encode_timestamp_tz(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::DateTimeTz(at) => plain(SqlValue::TimestampTz(at)),
        other => Err(refuse(&other, sql_type)),
    }
}

fn decode_timestamp_tz(
    value: SqlValue,
    request: &DecodeRequest<'_>,
) -> Result<HostValue, SqlBridgeError> {
    match value {
        SqlValue::TimestampTz(at) => Ok(match request.target {
            H::NaiveDateTime => HostValue::NaiveDateTime(at.naive_local()),
            _ => HostValue::DateTimeTz(at),
        }),
        other => Err(mismatch(&other, request)),
    }
}

fn encode_year_to_month(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::Period(period) if period.days != 0 => Err(SqlBridgeError::unsupported(
            format!("{period} has a day component that {sql_type} cannot hold"),
        )),
        HostValue::Period(period) => plain(SqlValue::IntervalYearToMonth(period.total_months())),
        other => Err(refuse(&other, sql_type)),
    }
}

fn decode_year_to_month(
    value: SqlValue,
    request: &DecodeRequest<'_>,
) -> Result<HostValue, SqlBridgeError> {
    match value {
        SqlValue::IntervalYearToMonth(months) => Period::of_months(months).map(HostValue::Period),
        other => Err(mismatch(&other, request)),
    }
}

fn encode_day_to_second(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::Duration(duration) => plain(SqlValue::IntervalDayToSecond(duration)),
        other => Err(refuse(&other, sql_type)),
    }
}

fn decode_day_to_second(
    value: SqlValue,
    request: &DecodeRequest<'_>,
) -> Result<HostValue, SqlBridgeError> {
    match value {
        SqlValue::IntervalDayToSecond(duration) => Ok(HostValue::Duration(duration)),
        other => Err(mismatch(&other, request)),
    }
}

fn encode_row_id(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::RowId(id) => plain(SqlValue::RowId(id.as_str().to_owned())),
        other => Err(refuse(&other, sql_type)),
    }
}

fn decode_row_id(
    value: SqlValue,
    request: &DecodeRequest<'_>,
) -> Result<HostValue, SqlBridgeError> {
    let text = match value {
        SqlValue::RowId(text) | SqlValue::Text(text) => text,
        other => return Err(mismatch(&other, request)),
    };
    Ok(match request.target {
        H::String => HostValue::String(text),
        _ => HostValue::RowId(RowId::new(text)),
    })
}

fn encode_json(value: HostValue, sql_type: SqlType) -> Result<BindValue, SqlBridgeError> {
    match value {
        HostValue::Json(json) => plain(SqlValue::Json(json)),
        HostValue::String(text) => serde_json::from_str(&text)
            .map(|json| BindValue::Value(SqlValue::Json(json)))
            .map_err(|err| {
                SqlBridgeError::unsupported(format!("text bound as {sql_type} is not JSON: {err}"))
            }),
        other => Err(refuse(&other, sql_type)),
    }
}

fn decode_json(value: SqlValue, request: &DecodeRequest<'_>) -> Result<HostValue, SqlBridgeError> {
    let json = match value {
        SqlValue::Json(json) => json,
        SqlValue::Text(text) => serde_json::from_str(&text).map_err(|err| {
            SqlBridgeError::unsupported(format!("{} column is not JSON: {err}", request.sql_type))
        })?,
        other => return Err(mismatch(&other, request)),
    };
    match request.target {
        H::String => serde_json::to_string(&json)
            .map(HostValue::String)
            .map_err(|err| SqlBridgeError::unsupported(err.to_string())),
        _ => Ok(HostValue::Json(json)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::registry::TypeRegistry;

    fn instant(nanos: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2038, 10, 7)
            .unwrap()
            .and_hms_nano_opt(15, 30, 9, nanos)
            .unwrap()
    }

    #[test]
    fn date_truncates_fractional_seconds() {
        let registry = TypeRegistry::global();
        let decoded = registry
            .decode(
                SqlValue::Timestamp(instant(999_999_999)),
                SqlType::Date,
                None,
            )
            .unwrap();
        assert_eq!(decoded, HostValue::NaiveDateTime(instant(0)));

        let decoded = registry
            .decode(
                SqlValue::Timestamp(instant(123)),
                SqlType::Timestamp,
                None,
            )
            .unwrap();
        assert_eq!(decoded, HostValue::NaiveDateTime(instant(123)));
    }

    #[test]
    fn integers_refuse_fractions_and_overflow() {
        let registry = TypeRegistry::global();
        let half = SqlValue::Number("1.5".parse().unwrap());
        assert!(
            registry
                .decode(half, SqlType::Number, Some(HostType::I64))
                .is_err()
        );
        let big = SqlValue::Number(BigDecimal::from(i64::from(i32::MAX) + 1));
        assert!(
            registry
                .decode(big.clone(), SqlType::Number, Some(HostType::I32))
                .is_err()
        );
        assert_eq!(
            registry
                .decode(big, SqlType::Number, Some(HostType::I64))
                .unwrap(),
            HostValue::I64(i64::from(i32::MAX) + 1)
        );
    }

    #[test]
    fn json_accepts_text_both_ways() {
        let registry = TypeRegistry::global();
        let encoded = registry
            .encode_value(HostValue::String(r#"{"a":[1,2]}"#.into()), Some(SqlType::Json))
            .unwrap();
        assert_eq!(encoded, SqlValue::Json(serde_json::json!({"a": [1, 2]})));
        let decoded = registry
            .decode(encoded, SqlType::Json, Some(HostType::String))
            .unwrap();
        assert_eq!(decoded, HostValue::String(r#"{"a":[1,2]}"#.into()));

        assert!(
            registry
                .encode_value(HostValue::String("{".into()), Some(SqlType::Json))
                .is_err()
        );
    }

    #[test]
    fn timestamp_with_zone_keeps_its_offset() {
        let registry = TypeRegistry::global();
        let at = chrono::DateTime::parse_from_rfc3339("2038-10-07T15:30:09.000000123+05:30").unwrap();
        let encoded = registry
            .encode_value(HostValue::DateTimeTz(at), None)
            .unwrap();
        let decoded = registry
            .decode(encoded.clone(), SqlType::TimestampWithTimeZone, None)
            .unwrap();
        assert_eq!(decoded, HostValue::DateTimeTz(at));
        assert_eq!(
            decoded.host_type(),
            HostType::DateTimeTz,
            "offset-aware by default"
        );
        let local = registry
            .decode(
                encoded,
                SqlType::TimestampWithTimeZone,
                Some(HostType::NaiveDateTime),
            )
            .unwrap();
        assert_eq!(local, HostValue::NaiveDateTime(instant(123)));
    }
}
