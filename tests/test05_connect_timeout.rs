use std::net::TcpListener;
use std::time::{Duration, Instant};

use reactive_sql_bridge::prelude::*;
use reactive_sql_bridge::test_utils::MemoryDriver;

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..150 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// A peer that completes the TCP handshake (through the backlog) but never says anything.
fn silent_listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").expect("bind listener")
}

#[tokio::test]
async fn connect_timeout_fires_while_the_driver_is_blocked() -> Result<(), SqlBridgeError> {
    let listener = silent_listener();
    let driver = MemoryDriver::new().with_handshake(listener.local_addr()?);
    let pool = WorkerPool::new(1);
    let factory = ConnectionFactory::from_options(
        driver.clone(),
        &ConnectOptions::builder()
            .host("localhost")
            .connect_timeout(Duration::from_millis(500))
            .finish(),
    )?
    .with_pool(pool.clone());

    let started = Instant::now();
    let err = factory.create().await.unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(err, SqlBridgeError::TimeoutError(limit) if limit == Duration::from_millis(500)));
    assert!(elapsed >= Duration::from_millis(500), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "fired late: {elapsed:?}");
    assert_eq!(driver.open_sessions(), 0);

    // The worker is still stuck in connect, so its slot is still taken.
    assert_eq!(pool.available(), 0);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), factory.create())
            .await
            .is_err(),
        "a second connect must wait for the slot"
    );

    // Once the peer goes away the blocked call returns and the slot is released.
    drop(listener);
    assert!(eventually(|| pool.available() == 1).await, "slot never released");
    assert_eq!(driver.open_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn slow_connect_within_the_timeout_succeeds() -> Result<(), SqlBridgeError> {
    let driver = MemoryDriver::new().with_connect_delay(Duration::from_millis(50));
    let factory = ConnectionFactory::from_options(
        driver.clone(),
        &ConnectOptions::builder()
            .url("r2dbc:oracle://localhost?connectTimeout=PT2S")
            .finish(),
    )?;
    assert_eq!(
        factory.configuration().connect_timeout(),
        Some(Duration::from_secs(2))
    );

    let conn = factory.create().await?;
    assert!(conn.is_usable());
    assert!(conn.validate().await?);
    conn.close().await?;
    assert_eq!(driver.open_sessions(), 0);
    assert_eq!(factory.pool().available(), factory.pool().capacity());
    Ok(())
}

#[tokio::test]
async fn connect_failures_surface_and_release_the_slot() -> Result<(), SqlBridgeError> {
    // Nothing listens on a port we just released.
    let addr = silent_listener().local_addr()?;
    let driver = MemoryDriver::new().with_handshake(addr);
    let pool = WorkerPool::new(1);
    let factory = ConnectionFactory::from_options(
        driver,
        &ConnectOptions::builder().host("localhost").finish(),
    )?
    .with_pool(pool.clone());

    let err = factory.create().await.unwrap_err();
    assert!(matches!(err, SqlBridgeError::CommunicationError(_)));
    assert!(err.closes_connection());
    assert!(eventually(|| pool.available() == 1).await);
    Ok(())
}
