use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures raised while resolving a connection configuration.
///
/// Each variant is a distinct, non-retryable misconfiguration. Resolution never hands back a
/// partially built configuration when one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("malformed connection URL `{url}`: {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("invalid value `{value}` for option `{key}`")]
    InvalidOption { key: String, value: String },

    #[error("required option `{0}` was not supplied by any configuration source")]
    MissingOption(&'static str),

    #[error("alias `{alias}` is not defined in {}", file.display())]
    MissingAlias { alias: String, file: PathBuf },

    #[error("malformed descriptor in {}: {reason}", file.display())]
    MalformedDescriptor { file: PathBuf, reason: String },

    #[error("configuration directory {} does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("failed to read {}: {reason}", file.display())]
    UnreadableFile { file: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum SqlBridgeError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Unsupported conversion: {0}")]
    UnsupportedConversionError(String),

    #[error("Stale resource: {0}")]
    StaleResourceError(String),

    #[error("Operation timed out after {0:?}")]
    TimeoutError(Duration),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),
}

impl SqlBridgeError {
    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedConversionError(message.into())
    }

    pub(crate) fn stale(message: impl Into<String>) -> Self {
        Self::StaleResourceError(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError(message.into())
    }

    /// Errors caused by caller misuse; raised at the call site and never worth retrying.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::UnsupportedConversionError(_)
                | Self::StaleResourceError(_)
                | Self::ValidationError(_)
        )
    }

    /// Errors after which the connection that produced them is closed or closing.
    #[must_use]
    pub fn closes_connection(&self) -> bool {
        matches!(self, Self::TimeoutError(_) | Self::CommunicationError(_))
    }
}

impl From<std::io::Error> for SqlBridgeError {
    fn from(err: std::io::Error) -> Self {
        SqlBridgeError::CommunicationError(err.to_string())
    }
}
