use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use reactive_sql_bridge::prelude::*;
use reactive_sql_bridge::test_utils::{MemoryCell, MemoryDriver, MemoryResult, memory_connection};
use serde_json::json;

fn noon_with_millis() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_milli_opt(12, 30, 45, 678)
        .unwrap()
}

fn scripted() -> MemoryDriver {
    MemoryDriver::new().with_result(
        "FROM typed_row",
        MemoryResult::default()
            .column("AMOUNT", SqlType::Number)
            .column("FLAG", SqlType::Number)
            .column("CREATED", SqlType::Date)
            .column("STAMPED", SqlType::Timestamp)
            .column("ZONED", SqlType::TimestampWithTimeZone)
            .column("TENURE", SqlType::IntervalYearToMonth)
            .column("ELAPSED", SqlType::IntervalDayToSecond)
            .column("DOC", SqlType::Json)
            .column("MISSING", SqlType::Varchar)
            .column("RID", SqlType::RowId)
            .row([
                MemoryCell::Value(SqlValue::Number(BigDecimal::from_str("12345.678901234567890123").unwrap())),
                MemoryCell::Value(SqlValue::Number(1.into())),
                MemoryCell::Value(SqlValue::Timestamp(noon_with_millis())),
                MemoryCell::Value(SqlValue::Timestamp(noon_with_millis())),
                MemoryCell::Value(SqlValue::TimestampTz(
                    DateTime::parse_from_rfc3339("2024-03-15T12:30:45+05:30").unwrap(),
                )),
                MemoryCell::Value(SqlValue::IntervalYearToMonth(-14)),
                MemoryCell::Value(SqlValue::IntervalDayToSecond(TimeDelta::milliseconds(90_061_500))),
                MemoryCell::Value(SqlValue::Json(json!({ "tags": ["a", "b"] }))),
                MemoryCell::Value(SqlValue::Null(SqlType::Varchar)),
                MemoryCell::Value(SqlValue::RowId("AAAR3sAAEAAAACXAAA".into())),
            ]),
    )
}

#[tokio::test]
async fn columns_decode_to_defaults_and_requested_types() -> Result<(), SqlBridgeError> {
    let conn = memory_connection(&scripted()).await?;
    let rows = conn
        .create_statement("SELECT * FROM typed_row")
        .execute()
        .await?
        .into_rows()?
        .collect_rows()
        .await?;
    let row = &rows[0];

    assert_eq!(
        row.get("amount")?,
        HostValue::Decimal(BigDecimal::from_str("12345.678901234567890123").unwrap())
    );
    assert_eq!(row.get_as::<String>("AMOUNT")?.as_deref(), Some("12345.678901234567890123"));
    assert!(matches!(
        row.get_typed("AMOUNT", HostType::I64),
        Err(SqlBridgeError::UnsupportedConversionError(_))
    ));

    // Booleans are never a default but are available on request.
    assert_eq!(row.get("FLAG")?, HostValue::Decimal(1.into()));
    assert_eq!(row.get_as::<bool>("FLAG")?, Some(true));
    assert_eq!(row.get_as::<i32>("FLAG")?, Some(1));

    // DATE keeps whole seconds: truncated, never rounded up.
    let created = row.get_as::<NaiveDateTime>("CREATED")?.unwrap();
    assert_eq!(created.time(), NaiveTime::from_hms_opt(12, 30, 45).unwrap());
    assert_eq!(row.get_as::<NaiveDate>("CREATED")?, Some(noon_with_millis().date()));

    assert_eq!(row.get_as::<NaiveDateTime>("STAMPED")?, Some(noon_with_millis()));
    assert_eq!(
        row.get_as::<NaiveTime>("STAMPED")?,
        Some(noon_with_millis().time())
    );

    let zoned = row.get_as::<DateTime<chrono::FixedOffset>>("ZONED")?.unwrap();
    assert_eq!(zoned.offset().local_minus_utc(), 5 * 3600 + 30 * 60);
    assert_eq!(
        row.get_as::<NaiveDateTime>("ZONED")?,
        Some(zoned.naive_local())
    );

    assert_eq!(row.get_as::<Period>("TENURE")?, Some(Period::of_months(-14)?));
    assert_eq!(
        row.get_as::<TimeDelta>("ELAPSED")?,
        Some(TimeDelta::milliseconds(90_061_500))
    );
    assert_eq!(row.get_as::<serde_json::Value>("DOC")?, Some(json!({ "tags": ["a", "b"] })));
    assert_eq!(
        row.get_as::<String>("DOC")?.as_deref(),
        Some(r#"{"tags":["a","b"]}"#)
    );

    // Typed nulls come back as the requested host type.
    assert_eq!(row.get("MISSING")?, HostValue::Null(HostType::String));
    assert_eq!(row.get_as::<String>("MISSING")?, None);

    assert_eq!(
        row.get_as::<RowId>("RID")?.map(|rid| rid.to_string()),
        Some("AAAR3sAAEAAAACXAAA".to_owned())
    );
    assert_eq!(row.get_as::<String>("RID")?.as_deref(), Some("AAAR3sAAEAAAACXAAA"));

    assert!(matches!(
        row.get("NOPE"),
        Err(SqlBridgeError::ExecutionError(_))
    ));
    assert!(matches!(row.get(42usize), Err(SqlBridgeError::ExecutionError(_))));
    Ok(())
}

#[tokio::test]
async fn binds_encode_through_the_registry() -> Result<(), SqlBridgeError> {
    let driver = MemoryDriver::new();
    let conn = memory_connection(&driver).await?;

    let mut insert = conn.create_statement(
        "INSERT INTO t VALUES (:flag, :amount, :created, :tenure, :doc, :nothing, :ratio)",
    );
    insert
        .bind_typed(":flag", false, SqlType::Number)?
        .bind(":amount", BigDecimal::from_str("0.1").unwrap())?
        .bind_typed(":created", noon_with_millis().date(), SqlType::Date)?
        .bind(":tenure", Period::new(1, 2, 0))?
        .bind_typed(":doc", r#"{"k": 1}"#, SqlType::Json)?
        .bind_null(":nothing", HostType::NaiveDateTime)?
        .bind_typed(":ratio", 0.25_f32, SqlType::BinaryFloat)?;
    insert.execute().await?;

    let executions = driver.executions();
    assert_eq!(
        executions[0].sql,
        "INSERT INTO t VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    );
    assert_eq!(
        executions[0].rows,
        vec![vec![
            MemoryCell::Value(SqlValue::Number(0.into())),
            MemoryCell::Value(SqlValue::Number(BigDecimal::from_str("0.1").unwrap())),
            MemoryCell::Value(SqlValue::Timestamp(
                noon_with_millis().date().and_hms_opt(0, 0, 0).unwrap()
            )),
            MemoryCell::Value(SqlValue::IntervalYearToMonth(14)),
            MemoryCell::Value(SqlValue::Json(json!({ "k": 1 }))),
            MemoryCell::Value(SqlValue::Null(SqlType::Timestamp)),
            MemoryCell::Value(SqlValue::BinaryFloat(0.25)),
        ]]
    );
    Ok(())
}

#[tokio::test]
async fn unsupported_binds_are_rejected_at_the_call() -> Result<(), SqlBridgeError> {
    let driver = MemoryDriver::new();
    let conn = memory_connection(&driver).await?;
    let mut stmt = conn.create_statement("UPDATE t SET span = :span");

    let err = stmt
        .bind_typed(":span", Period::new(1, 0, 3), SqlType::IntervalYearToMonth)
        .unwrap_err();
    assert!(matches!(err, SqlBridgeError::UnsupportedConversionError(_)));
    assert!(err.is_local());

    let err = stmt
        .bind_typed(":span", TimeDelta::days(3), SqlType::IntervalYearToMonth)
        .unwrap_err();
    assert!(matches!(err, SqlBridgeError::UnsupportedConversionError(_)));

    // Nothing was bound, so the statement cannot run.
    let err = stmt.execute().await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::ValidationError(_)));
    assert_eq!(driver.count_calls("execute"), 0);
    Ok(())
}
