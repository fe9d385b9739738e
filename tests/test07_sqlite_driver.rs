#![cfg(feature = "sqlite")]

use std::str::FromStr;

use bigdecimal::BigDecimal;
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use reactive_sql_bridge::prelude::*;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS people (
        id INTEGER PRIMARY KEY,
        name VARCHAR2(40) NOT NULL,
        amount NUMBER(10, 2),
        created TIMESTAMP,
        body CLOB,
        image BLOB
    );
";

fn created() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_milli_opt(12, 30, 45, 678)
        .unwrap()
}

fn factory(path: &str) -> Result<ConnectionFactory, SqlBridgeError> {
    let config = ConnectOptions::builder().host("localhost").resolve()?;
    Ok(SqliteDriver::builder(path).init_sql(SCHEMA).build(config))
}

#[tokio::test]
async fn rows_and_lobs_round_trip() -> Result<(), SqlBridgeError> {
    let conn = factory(":memory:")?.create().await?;

    let mut insert = conn.create_statement(
        "INSERT INTO people (id, name, amount, created, body, image)
         VALUES (:id, :name, :amount, :created, :body, :image)",
    );
    insert
        .bind(":id", 1_i64)?
        .bind(":name", "Ada")?
        .bind(":amount", BigDecimal::from_str("12.5").unwrap())?
        .bind(":created", created())?
        .bind(":body", Clob::from_text("analytical engine notes"))?
        .bind(":image", Blob::from_bytes(Bytes::from_static(b"\x89PNG")))?
        .add_row()?;
    insert
        .bind(":id", 2_i64)?
        .bind(":name", "Grace")?
        .bind_null(":amount", HostType::Decimal)?
        .bind_null(":created", HostType::NaiveDateTime)?
        .bind_null(":body", HostType::Clob)?
        .bind_null(":image", HostType::Blob)?;
    assert_eq!(insert.execute().await?.update_counts(), &[1, 1]);

    let mut rows = conn
        .create_statement("SELECT id, name, amount, created, body, image FROM people ORDER BY id")
        .execute()
        .await?
        .into_rows()?;
    assert_eq!(rows.columns().len(), 6);

    // LOB handles are only good until the cursor moves, so read them row by row.
    let first = rows.next().await.expect("first row")?;
    assert_eq!(first.sql_type("body")?, SqlType::Clob);
    assert_eq!(first.get_as::<i64>("ID")?, Some(1));
    assert_eq!(first.get_as::<String>("name")?.as_deref(), Some("Ada"));
    assert_eq!(
        first.get_as::<BigDecimal>("amount")?,
        Some(BigDecimal::from_str("12.5").unwrap())
    );
    assert_eq!(first.get_as::<NaiveDateTime>("created")?, Some(created()));
    assert_eq!(
        first
            .get_as::<Clob>("body")?
            .expect("clob")
            .materialize()
            .await?,
        "analytical engine notes"
    );
    assert_eq!(
        first
            .get_as::<Blob>("image")?
            .expect("blob")
            .materialize()
            .await?,
        Bytes::from_static(b"\x89PNG")
    );

    let second = rows.next().await.expect("second row")?;
    assert_eq!(second.get_as::<String>("name")?.as_deref(), Some("Grace"));
    assert_eq!(second.get_as::<BigDecimal>("amount")?, None);
    assert_eq!(second.get_as::<Clob>("body")?, None);
    assert!(rows.next().await.is_none());

    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn long_decimals_keep_every_digit() -> Result<(), SqlBridgeError> {
    let config = ConnectOptions::builder().host("localhost").resolve()?;
    let conn = SqliteDriver::builder(":memory:")
        .init_sql("CREATE TABLE t (id INTEGER, amount NUMBER)")
        .build(config)
        .create()
        .await?;

    let pi = BigDecimal::from_str("3.14159265358979323846264338327950288419").unwrap();
    let wide = BigDecimal::from_str("123456789012345678901234567890").unwrap();
    let short = BigDecimal::from_str("0.25").unwrap();
    let mut insert = conn.create_statement("INSERT INTO t (id, amount) VALUES (:id, :amount)");
    insert.bind(":id", 1_i64)?.bind(":amount", pi.clone())?.add_row()?;
    insert.bind(":id", 2_i64)?.bind(":amount", wide.clone())?.add_row()?;
    insert.bind(":id", 3_i64)?.bind(":amount", short.clone())?;
    insert.execute().await?;

    let rows = conn
        .create_statement("SELECT amount FROM t ORDER BY id")
        .execute()
        .await?
        .into_rows()?
        .collect_rows()
        .await?;
    let amounts = rows
        .iter()
        .map(|row| row.get_as::<BigDecimal>("amount"))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(amounts, vec![Some(pi), Some(wide), Some(short)]);

    // Values that fit a REAL are still stored as numbers SQL can compare.
    let small = conn
        .create_statement("SELECT id FROM t WHERE amount < 1")
        .execute()
        .await?
        .into_rows()?
        .collect_rows()
        .await?;
    assert_eq!(small.len(), 1);
    assert_eq!(small[0].get_as::<i64>("id")?, Some(3));

    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn failing_batches_roll_back_as_a_whole() -> Result<(), SqlBridgeError> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bridge.db").display().to_string();
    let factory = factory(&path)?;
    let writer = factory.create().await?;

    let mut insert = writer.create_statement("INSERT INTO people (id, name) VALUES (?, ?)");
    insert.bind(0usize, 1_i64)?.bind(1usize, "Ada")?.add_row()?;
    insert.bind(0usize, 1_i64)?.bind(1usize, "duplicate")?;
    let err = insert.execute().await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::SqliteError(_)));
    assert!(writer.is_usable());

    // A second session on the same file sees nothing from the failed batch.
    let reader = factory.create().await?;
    let count = reader
        .create_statement("SELECT COUNT(*) AS n FROM people")
        .execute()
        .await?
        .into_rows()?
        .collect_rows()
        .await?;
    assert_eq!(count[0].get_as::<i64>("N")?, Some(0));

    writer.close().await?;
    reader.close().await?;
    Ok(())
}

#[tokio::test]
async fn queries_reject_batches() -> Result<(), SqlBridgeError> {
    let conn = factory(":memory:")?.create().await?;
    let mut query = conn.create_statement("SELECT name FROM people WHERE id = :id");
    query.bind(":id", 1_i64)?.add_row()?;
    query.bind(":id", 2_i64)?;
    let err = query.execute().await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::ValidationError(_)));
    Ok(())
}

#[tokio::test]
async fn bad_statement_cache_size_fails_the_connect() -> Result<(), SqlBridgeError> {
    let config = ConnectOptions::builder()
        .host("localhost")
        .option("oracle.jdbc.implicitStatementCacheSize", "lots")
        .resolve()?;
    let err = SqliteDriver::builder(":memory:")
        .build(config)
        .create()
        .await
        .unwrap_err();
    assert!(matches!(err, SqlBridgeError::ValidationError(ref m) if m.contains("lots")));
    Ok(())
}
