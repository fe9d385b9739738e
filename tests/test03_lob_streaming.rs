use bytes::Bytes;
use futures_util::stream;
use reactive_sql_bridge::prelude::*;
use reactive_sql_bridge::test_utils::{MemoryCell, MemoryDriver, MemoryResult, memory_connection};

fn documents(driver: MemoryDriver) -> MemoryDriver {
    driver.with_result(
        "FROM documents",
        MemoryResult::default()
            .column("ID", SqlType::Number)
            .column("BODY", SqlType::Clob)
            .column("IMAGE", SqlType::Blob)
            .row([
                MemoryCell::Value(SqlValue::Number(1.into())),
                MemoryCell::Clob("naïve café ☕ text".into()),
                MemoryCell::Blob(Bytes::from_static(b"0123456789")),
            ])
            .row([
                MemoryCell::Value(SqlValue::Number(2.into())),
                MemoryCell::Clob("second".into()),
                MemoryCell::Value(SqlValue::Null(SqlType::Blob)),
            ]),
    )
}

async fn query(conn: &Connection) -> Result<RowStream, SqlBridgeError> {
    conn.create_statement("SELECT id, body, image FROM documents")
        .execute()
        .await?
        .into_rows()
}

#[tokio::test]
async fn blob_chunks_arrive_in_order_one_read_per_chunk() -> Result<(), SqlBridgeError> {
    let driver = documents(MemoryDriver::new().with_lob_chunk_limit(4));
    let conn = memory_connection(&driver).await?;
    let mut rows = query(&conn).await?;

    let row = rows.next().await.expect("first row")?;
    let image = row.get_as::<Blob>("IMAGE")?.expect("non-null blob");
    let reads_before = driver.count_calls("read_lob");
    let chunks: Vec<Bytes> = image
        .stream()?
        .map(|chunk| chunk.expect("chunk"))
        .collect()
        .await;
    assert_eq!(
        chunks,
        vec![
            Bytes::from_static(b"0123"),
            Bytes::from_static(b"4567"),
            Bytes::from_static(b"89"),
        ]
    );
    // Three data chunks plus the empty read that ends the value.
    assert_eq!(driver.count_calls("read_lob") - reads_before, 4);

    // Single consumption: the handle and every copy of it are spent.
    assert!(matches!(image.stream(), Err(SqlBridgeError::StaleResourceError(_))));
    let again = row.get_as::<Blob>("IMAGE")?.expect("non-null blob");
    assert!(matches!(
        again.materialize().await,
        Err(SqlBridgeError::StaleResourceError(_))
    ));

    // Closing the cursor releases the CLOB the row vended but nobody read.
    drop(rows);
    assert!(conn.validate().await?);
    assert_eq!(driver.open_lobs(), 0);
    assert!(matches!(
        row.get_as::<Clob>("BODY")?.expect("non-null clob").stream(),
        Err(SqlBridgeError::StaleResourceError(_))
    ));
    Ok(())
}

#[tokio::test]
async fn clob_materializes_across_character_chunks() -> Result<(), SqlBridgeError> {
    let driver = documents(MemoryDriver::new().with_lob_chunk_limit(3));
    let conn = memory_connection(&driver).await?;
    let mut rows = query(&conn).await?;

    let row = rows.next().await.expect("first row")?;
    let body = row.get_as::<Clob>("BODY")?.expect("non-null clob");
    assert_eq!(body.materialize().await?, "naïve café ☕ text");
    Ok(())
}

#[tokio::test]
async fn advancing_the_cursor_invalidates_earlier_handles() -> Result<(), SqlBridgeError> {
    let driver = documents(MemoryDriver::new());
    let conn = memory_connection(&driver).await?;
    let mut rows = query(&conn).await?;

    let first = rows.next().await.expect("first row")?;
    let stale_body = first.get_as::<Clob>("BODY")?.expect("non-null clob");
    let second = rows.next().await.expect("second row")?;

    assert!(matches!(
        stale_body.stream(),
        Err(SqlBridgeError::StaleResourceError(_))
    ));
    assert_eq!(
        second.get_as::<Clob>("BODY")?.expect("clob").materialize().await?,
        "second"
    );
    assert_eq!(second.get_as::<Blob>("IMAGE")?, None);

    // The worker released the first row's locators when the cursor moved on.
    assert!(
        driver
            .calls()
            .iter()
            .any(|call| call.starts_with("free_lob clob#")),
        "calls: {:?}",
        driver.calls()
    );
    assert!(rows.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn bound_streams_upload_chunk_by_chunk() -> Result<(), SqlBridgeError> {
    let driver = MemoryDriver::new();
    let conn = memory_connection(&driver).await?;

    let chunks = vec![
        Ok(Bytes::from_static(b"ab")),
        Ok(Bytes::new()),
        Ok(Bytes::from_static(b"cd")),
        Ok(Bytes::from_static(b"e")),
    ];
    let mut insert = conn.create_statement("INSERT INTO documents (id, image) VALUES (?, ?)");
    insert
        .bind(0usize, 7_i64)?
        .bind(1usize, Blob::from_stream(stream::iter(chunks)))?;
    assert_eq!(insert.execute().await?.rows_updated(), 1);

    let calls = driver.calls();
    let ops: Vec<&str> = calls
        .iter()
        .map(|call| call.split(' ').next().unwrap_or_default())
        .filter(|op| !matches!(*op, "connect" | "free_lob"))
        .collect();
    assert_eq!(
        ops,
        vec!["create_temporary_lob", "write_lob", "write_lob", "write_lob", "execute"]
    );
    assert_eq!(
        driver.executions()[0].rows,
        vec![vec![
            MemoryCell::Value(SqlValue::Number(7.into())),
            MemoryCell::Blob(Bytes::from_static(b"abcde")),
        ]]
    );

    // The temporary is freed once the statement has run.
    assert!(conn.validate().await?);
    assert_eq!(driver.open_lobs(), 0);
    Ok(())
}

#[tokio::test]
async fn failing_source_stream_aborts_the_statement() -> Result<(), SqlBridgeError> {
    let driver = MemoryDriver::new();
    let conn = memory_connection(&driver).await?;

    let chunks = vec![
        Ok("partial ".to_owned()),
        Err(SqlBridgeError::ExecutionError("source went away".into())),
    ];
    let mut insert = conn.create_statement("INSERT INTO documents (body) VALUES (:body)");
    insert.bind(":body", Clob::from_stream(stream::iter(chunks)))?;
    let err = insert.execute().await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::ExecutionError(ref m) if m == "source went away"));

    assert_eq!(driver.count_calls("execute"), 0);
    assert!(conn.validate().await?);
    assert_eq!(driver.open_lobs(), 0);
    Ok(())
}

#[tokio::test]
async fn materialize_handles_empty_and_multi_chunk_sources() -> Result<(), SqlBridgeError> {
    let empty = Blob::from_stream(stream::iter(Vec::<Result<Bytes, SqlBridgeError>>::new()));
    assert!(empty.materialize().await?.is_empty());

    let single = Blob::from_bytes(Bytes::from_static(b"only"));
    assert_eq!(single.materialize().await?, Bytes::from_static(b"only"));

    let large: Vec<Result<Bytes, SqlBridgeError>> =
        (0..64u8).map(|i| Ok(Bytes::from(vec![i; 1000]))).collect();
    let blob = Blob::from_stream(stream::iter(large));
    let bytes = blob.materialize().await?;
    assert_eq!(bytes.len(), 64_000);
    assert!(bytes.chunks(1000).enumerate().all(|(i, chunk)| chunk.iter().all(|b| usize::from(*b) == i)));

    let mut acc = LobAccumulator::new();
    for _ in 0..64 {
        acc.push(&[0u8; 1000]);
    }
    assert!(acc.regrowths() > 0 && acc.regrowths() < 10);
    Ok(())
}
