//! Extended driver properties and the `ojdbc.properties` defaults file.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

pub(crate) const PROPERTIES_FILE: &str = "ojdbc.properties";

/// Fully-qualified name of the directory reference option.
pub const TNS_ADMIN: &str = "oracle.net.tns_admin";

/// An extended option recognized by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedOption {
    pub name: &'static str,
    pub alias: Option<&'static str>,
}

const fn option(name: &'static str, alias: &'static str) -> ExtendedOption {
    ExtendedOption {
        name,
        alias: Some(alias),
    }
}

/// Every extended option that is passed through to the driver. Anything else is ignored.
pub const EXTENDED_OPTIONS: &[ExtendedOption] = &[
    option(TNS_ADMIN, "TNS_ADMIN"),
    option("oracle.net.wallet_location", "TLS_WALLET_LOCATION"),
    option("oracle.net.wallet_password", "TLS_WALLET_PASSWORD"),
    option("javax.net.ssl.keyStore", "TLS_KEYSTORE"),
    option("javax.net.ssl.keyStoreType", "TLS_KEYSTORE_TYPE"),
    option("javax.net.ssl.keyStorePassword", "TLS_KEYSTORE_PASSWORD"),
    option("javax.net.ssl.trustStore", "TLS_TRUSTSTORE"),
    option("javax.net.ssl.trustStoreType", "TLS_TRUSTSTORE_TYPE"),
    option("javax.net.ssl.trustStorePassword", "TLS_TRUSTSTORE_PASSWORD"),
    option("oracle.net.authentication_services", "AUTHENTICATION_SERVICES"),
    option("oracle.net.ssl_certificate_alias", "TLS_CERTIFICATE_ALIAS"),
    option("oracle.net.ssl_server_dn_match", "TLS_SERVER_DN_MATCH"),
    option("oracle.net.ssl_server_cert_dn", "TLS_SERVER_CERT_DN"),
    option("oracle.net.ssl_version", "TLS_VERSION"),
    option("oracle.net.ssl_cipher_suites", "TLS_CIPHER_SUITES"),
    option(
        "ssl.keyManagerFactory.algorithm",
        "TLS_KEYMANAGERFACTORY_ALGORITHM",
    ),
    option(
        "ssl.trustManagerFactory.algorithm",
        "TLS_TRUSTMANAGERFACTORY_ALGORITHM",
    ),
    option("oracle.net.ssl_context_protocol", "SSL_CONTEXT_PROTOCOL"),
    option("oracle.jdbc.fanEnabled", "FAN_ENABLED"),
    option(
        "oracle.jdbc.implicitStatementCacheSize",
        "IMPLICIT_STATEMENT_CACHE_SIZE",
    ),
    option("oracle.jdbc.defaultLobPrefetchSize", "DEFAULT_LOB_PREFETCH_SIZE"),
    option("oracle.net.disableOob", "DISABLE_OUT_OF_BAND_BREAK"),
    option(
        "oracle.jdbc.enableQueryResultCache",
        "ENABLE_QUERY_RESULT_CACHE",
    ),
    ExtendedOption {
        name: "oracle.jdbc.J2EE13Compliant",
        alias: None,
    },
    ExtendedOption {
        name: "oracle.jdbc.enableACSupport",
        alias: None,
    },
];

/// Extended properties applied at the lowest precedence.
pub const DEFAULT_PROPERTIES: &[(&str, &str)] = &[
    ("oracle.jdbc.J2EE13Compliant", "true"),
    ("oracle.jdbc.enableACSupport", "false"),
    ("oracle.jdbc.implicitStatementCacheSize", "25"),
];

/// How a key was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyForm {
    FullyQualified,
    Alias,
}

/// Map a key (fully-qualified or short alias) to its fully-qualified name.
pub(crate) fn canonical_name(key: &str) -> Option<(&'static str, KeyForm)> {
    EXTENDED_OPTIONS.iter().find_map(|option| {
        if option.name == key {
            Some((option.name, KeyForm::FullyQualified))
        } else if option.alias.is_some_and(|alias| alias.eq_ignore_ascii_case(key)) {
            Some((option.name, KeyForm::Alias))
        } else {
            None
        }
    })
}

/// Normalize one source's extended options. Aliases are applied first so that a
/// fully-qualified name supplied alongside its alias always wins.
pub(crate) fn normalize<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> BTreeMap<String, String> {
    let mut aliased = Vec::new();
    let mut qualified = Vec::new();
    for (key, value) in entries {
        match canonical_name(key) {
            Some((name, KeyForm::Alias)) => aliased.push((name, value)),
            Some((name, KeyForm::FullyQualified)) => qualified.push((name, value)),
            None => tracing::debug!(option = key, "ignoring unrecognized connection option"),
        }
    }

    aliased
        .into_iter()
        .chain(qualified)
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect()
}

/// Parse `key=value` / `key: value` lines. `#` and `!` start comments; a trailing backslash
/// continues the value on the next line.
pub(crate) fn parse_properties(contents: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut pending = String::new();

    for raw in contents.lines() {
        let line = raw.trim();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }
        if let Some(continued) = line.strip_suffix('\\') {
            pending.push_str(continued);
            continue;
        }
        pending.push_str(line);
        let logical = std::mem::take(&mut pending);

        let split = logical.find(['=', ':']);
        let (key, value) = match split {
            Some(idx) => (&logical[..idx], &logical[idx + 1..]),
            None => (logical.as_str(), ""),
        };
        let key = key.trim();
        if !key.is_empty() {
            entries.push((key.to_owned(), value.trim().to_owned()));
        }
    }
    entries
}

pub(crate) fn load_properties(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|err| ConfigError::UnreadableFile {
        file: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(parse_properties(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_properties_syntax() {
        let entries = parse_properties(
            "# defaults\n\
             ! also a comment\n\
             user=scott\n\
             password : tiger \n\
             \n\
             oracle.net.ssl_version=TLSv1.2,\\\n\
             TLSv1.3\n",
        );
        assert_eq!(
            entries,
            vec![
                ("user".to_owned(), "scott".to_owned()),
                ("password".to_owned(), "tiger".to_owned()),
                (
                    "oracle.net.ssl_version".to_owned(),
                    "TLSv1.2,TLSv1.3".to_owned()
                ),
            ]
        );
    }

    #[test]
    fn fully_qualified_name_beats_alias() {
        let normalized = normalize([
            ("oracle.net.ssl_version", "TLSv1.3"),
            ("TLS_VERSION", "TLSv1.2"),
            ("tls_keystore_type", "PKCS12"),
            ("This is not supported", "true"),
            ("oracle.jdbc.retainV9LongBindBehavior", "true"),
        ]);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized["oracle.net.ssl_version"], "TLSv1.3");
        assert_eq!(normalized["javax.net.ssl.keyStoreType"], "PKCS12");
    }
}
