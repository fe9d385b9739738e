use std::fs;
use std::path::Path;
use std::time::Duration;

use reactive_sql_bridge::config::{ConnectOptions, resolve};
use reactive_sql_bridge::{ConfigError, SqlBridgeError};
use tempfile::TempDir;

const DESCRIPTOR: &str = "\
# test aliases
sales, sales_ro =
  (DESCRIPTION =
    (ADDRESS_LIST =
      (ADDRESS = (PROTOCOL = tcps)(HOST = db.internal)(PORT = 1523))
      (ADDRESS = (PROTOCOL = tcp)(HOST = standby.internal)(PORT = 1524))
    )
    (CONNECT_DATA = (SERVICE_NAME = sales.example))
  )
";

const PROPERTIES: &str = "\
! defaults for every connection
user=scott
password: tiger
TLS_VERSION=1.3
";

fn config_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("tnsnames.ora"), DESCRIPTOR).expect("write tnsnames.ora");
    fs::write(dir.path().join("ojdbc.properties"), PROPERTIES).expect("write ojdbc.properties");
    dir
}

fn url_for(dir: &Path, port: Option<u16>) -> String {
    let port = port.map(|p| format!(":{p}")).unwrap_or_default();
    format!(
        "r2dbc:oracle://sales{port}?TNS_ADMIN={}&connectTimeout=PT0.5S",
        urlencoding::encode(&dir.display().to_string())
    )
}

#[test]
fn inline_beats_url_beats_descriptor() -> Result<(), SqlBridgeError> {
    let dir = config_dir();

    let inline = resolve(
        &ConnectOptions::builder()
            .url(url_for(dir.path(), Some(1522)))
            .port(1521)
            .finish(),
    )?;
    assert_eq!(inline.port(), 1521);

    let url = resolve(
        &ConnectOptions::builder()
            .url(url_for(dir.path(), Some(1522)))
            .finish(),
    )?;
    assert_eq!(url.port(), 1522);

    let descriptor = resolve(&ConnectOptions::builder().url(url_for(dir.path(), None)).finish())?;
    assert_eq!(descriptor.port(), 1523);

    for config in [&inline, &url, &descriptor] {
        assert_eq!(config.host(), "db.internal");
        assert_eq!(config.protocol(), "tcps");
        assert_eq!(config.service(), Some("sales.example"));
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(500)));
        // Property file defaults sit below every other source.
        assert_eq!(config.user(), Some("scott"));
        assert_eq!(config.password(), Some("tiger"));
        assert_eq!(config.extended_option("oracle.net.ssl_version"), Some("1.3"));
        // The directory reference is consumed, not persisted.
        assert_eq!(config.extended_option("oracle.net.tns_admin"), None);
    }
    Ok(())
}

#[test]
fn aliases_are_case_insensitive_and_listed_names_match() -> Result<(), SqlBridgeError> {
    let dir = config_dir();
    let config = resolve(
        &ConnectOptions::builder()
            .host("SALES_RO")
            .tns_admin(dir.path())
            .user("hr")
            .finish(),
    )?;
    assert_eq!(config.host(), "db.internal");
    assert_eq!(config.user(), Some("hr"));
    Ok(())
}

#[test]
fn literal_hosts_skip_the_descriptor() -> Result<(), SqlBridgeError> {
    let dir = config_dir();
    let config = resolve(
        &ConnectOptions::builder()
            .host("10.0.0.7")
            .tns_admin(dir.path())
            .finish(),
    )?;
    assert_eq!(config.host(), "10.0.0.7");
    assert_eq!(config.port(), 1521);
    assert_eq!(config.service(), None);
    Ok(())
}

#[test]
fn unknown_alias_and_missing_directory_are_config_errors() {
    let dir = config_dir();
    let err = resolve(
        &ConnectOptions::builder()
            .host("billing")
            .tns_admin(dir.path())
            .finish(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SqlBridgeError::ConfigError(ConfigError::MissingAlias { ref alias, .. }) if alias == "billing"
    ));
    assert!(err.is_local());

    let missing = dir.path().join("does-not-exist");
    let err = resolve(
        &ConnectOptions::builder()
            .host("db.example.com")
            .tns_admin(&missing)
            .finish(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SqlBridgeError::ConfigError(ConfigError::DirectoryNotFound(ref path)) if path == &missing
    ));
}

#[test]
fn fully_qualified_names_win_over_aliases() -> Result<(), SqlBridgeError> {
    let config = resolve(
        &ConnectOptions::builder()
            .host("db.example.com")
            .option("oracle.jdbc.implicitStatementCacheSize", "40")
            .option("IMPLICIT_STATEMENT_CACHE_SIZE", "10")
            .option("noSuchOption", "ignored")
            .finish(),
    )?;
    assert_eq!(
        config.extended_option("oracle.jdbc.implicitStatementCacheSize"),
        Some("40")
    );
    assert_eq!(config.extended_option("noSuchOption"), None);
    Ok(())
}

#[test]
fn options_load_from_json() -> Result<(), SqlBridgeError> {
    let options = ConnectOptions::from_json(
        r#"{ "host": "db.example.com", "port": 1600, "user": "hr" }"#,
    )?;
    let config = resolve(&options)?;
    assert_eq!(config.port(), 1600);
    assert_eq!(config.user(), Some("hr"));
    Ok(())
}
