//! Connection configuration: inline options, URL, `tnsnames.ora` aliases and
//! `ojdbc.properties` defaults merged into one immutable [`ConnectionConfiguration`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

mod descriptor;
mod options;
mod properties;
mod resolve;
mod url;

pub use options::{ConnectOptions, ConnectOptionsBuilder, parse_duration};
pub use properties::{DEFAULT_PROPERTIES, EXTENDED_OPTIONS, ExtendedOption, TNS_ADMIN};
pub use resolve::resolve;

pub const DEFAULT_PORT: u16 = 1521;
pub const DEFAULT_PROTOCOL: &str = "tcp";

/// The resolved, immutable configuration for one connection attempt.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfiguration {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) protocol: String,
    pub(crate) service: Option<String>,
    pub(crate) user: Option<String>,
    #[serde(skip)]
    pub(crate) password: Option<String>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) statement_timeout: Option<Duration>,
    pub(crate) extended: BTreeMap<String, String>,
}

impl ConnectionConfiguration {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `tcp` or `tcps`.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Deadline applied to each statement, fetch and LOB call.
    #[must_use]
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    /// Extended driver properties keyed by fully-qualified name.
    #[must_use]
    pub fn extended(&self) -> &BTreeMap<String, String> {
        &self.extended
    }

    #[must_use]
    pub fn extended_option(&self, name: &str) -> Option<&str> {
        self.extended.get(name).map(String::as_str)
    }
}

impl fmt::Debug for ConnectionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfiguration")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("service", &self.service)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connect_timeout", &self.connect_timeout)
            .field("statement_timeout", &self.statement_timeout)
            .field("extended", &self.extended)
            .finish()
    }
}
