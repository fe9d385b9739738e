use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigError, SqlBridgeError};

/// Inline connection options: the highest-precedence configuration source.
///
/// Anything left unset here may still be supplied by the URL, a `tnsnames.ora` alias or an
/// `ojdbc.properties` file.
/// ```rust
/// use std::time::Duration;
/// use reactive_sql_bridge::prelude::*;
///
/// let options = ConnectOptions::builder()
///     .url("r2dbc:oracle://db.example.com:1522/sales")
///     .port(1521)
///     .connect_timeout(Duration::from_millis(500))
///     .option("TLS_VERSION", "TLSv1.3")
///     .finish();
/// # let _ = options;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(alias = "service")]
    pub database: Option<String>,
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Option<Duration>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub statement_timeout: Option<Duration>,
    /// Directory holding `tnsnames.ora` / `ojdbc.properties`. Used during resolution only.
    #[serde(alias = "TNS_ADMIN")]
    pub tns_admin: Option<PathBuf>,
    /// Untyped options: standard option names or extended driver properties.
    pub options: BTreeMap<String, String>,
}

impl ConnectOptions {
    #[must_use]
    pub fn builder() -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::new()
    }

    /// Load options from a JSON document using camelCase keys.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidOption`] if the document does not describe valid options.
    pub fn from_json(json: &str) -> Result<Self, SqlBridgeError> {
        serde_json::from_str(json).map_err(|err| {
            SqlBridgeError::from(ConfigError::InvalidOption {
                key: "<json>".into(),
                value: err.to_string(),
            })
        })
    }
}

/// Fluent builder for [`ConnectOptions`].
#[derive(Debug, Clone, Default)]
pub struct ConnectOptionsBuilder {
    opts: ConnectOptions,
}

impl ConnectOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.opts.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.opts.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.opts.port = Some(port);
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.opts.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.opts.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.opts.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.opts.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.opts.statement_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn tns_admin(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts.tns_admin = Some(dir.into());
        self
    }

    /// Set an option by name. Standard names (`connectTimeout`, `user`, ...) are validated at
    /// resolution time; extended names may be fully-qualified or short aliases.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> ConnectOptions {
        self.opts
    }

    /// Resolve the options against every configuration source.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::ConfigError`] on any resolution failure.
    pub fn resolve(self) -> Result<super::ConnectionConfiguration, SqlBridgeError> {
        super::resolve(&self.finish())
    }
}

/// Parse an ISO-8601 duration (`PT0.5S`, `PT1M30S`, `P1DT2H`) or a plain millisecond count.
#[must_use]
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if let Ok(millis) = text.parse::<u64>() {
        return Some(Duration::from_millis(millis));
    }

    let upper = text.to_ascii_uppercase();
    let body = upper.strip_prefix('P')?;
    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (body, None),
    };

    let mut total = 0f64;
    let mut any = false;
    for (part, units) in [
        (date_part, &[('D', 86_400f64)][..]),
        (
            time_part.unwrap_or(""),
            &[('H', 3_600f64), ('M', 60f64), ('S', 1f64)][..],
        ),
    ] {
        let mut rest = part;
        for &(designator, seconds) in units {
            if let Some(idx) = rest.find(designator) {
                let amount: f64 = rest[..idx].parse().ok()?;
                if amount < 0.0 {
                    return None;
                }
                total += amount * seconds;
                rest = &rest[idx + 1..];
                any = true;
            }
        }
        if !rest.is_empty() {
            return None;
        }
    }
    if time_part == Some("") || !any {
        return None;
    }
    Some(Duration::from_secs_f64(total))
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(u64),
        Text(String),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Repr::Millis(millis)) => Ok(Some(Duration::from_millis(millis))),
        Some(Repr::Text(text)) => parse_duration(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration `{text}`"))),
    }
}
