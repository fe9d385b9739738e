use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, SqlBridgeError};

use super::descriptor::{DESCRIPTOR_FILE, DescriptorFile};
use super::options::{ConnectOptions, parse_duration};
use super::properties::{self, DEFAULT_PROPERTIES, PROPERTIES_FILE, TNS_ADMIN};
use super::url::parse_url;
use super::{ConnectionConfiguration, DEFAULT_PORT, DEFAULT_PROTOCOL};

/// Values contributed by one configuration source.
#[derive(Debug, Default)]
struct Layer {
    host: Option<String>,
    port: Option<u16>,
    protocol: Option<String>,
    service: Option<String>,
    user: Option<String>,
    password: Option<String>,
    connect_timeout: Option<Duration>,
    statement_timeout: Option<Duration>,
    extended: BTreeMap<String, String>,
}

impl Layer {
    /// Build a layer from untyped `key=value` pairs: standard option names fill the typed
    /// fields, everything else goes through extended option normalization.
    fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut layer = Layer::default();
        let mut extended = Vec::new();
        for (key, value) in pairs {
            let invalid = || ConfigError::InvalidOption {
                key: key.to_owned(),
                value: value.to_owned(),
            };
            match key.to_ascii_lowercase().as_str() {
                "host" => layer.host = Some(value.to_owned()),
                "port" => layer.port = Some(value.parse().map_err(|_| invalid())?),
                "database" | "service" => layer.service = Some(value.to_owned()),
                "user" => layer.user = Some(value.to_owned()),
                "password" => layer.password = Some(value.to_owned()),
                "connecttimeout" => {
                    layer.connect_timeout = Some(parse_duration(value).ok_or_else(invalid)?);
                }
                "statementtimeout" => {
                    layer.statement_timeout = Some(parse_duration(value).ok_or_else(invalid)?);
                }
                _ => extended.push((key, value)),
            }
        }
        layer.extended = properties::normalize(extended);
        Ok(layer)
    }

    fn take_directory(&mut self) -> Option<PathBuf> {
        self.extended.remove(TNS_ADMIN).map(PathBuf::from)
    }
}

fn inline_layer(options: &ConnectOptions) -> Result<Layer, ConfigError> {
    let mut layer = Layer::from_pairs(
        options
            .options
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    )?;
    if options.host.is_some() {
        layer.host.clone_from(&options.host);
    }
    if options.port.is_some() {
        layer.port = options.port;
    }
    if options.database.is_some() {
        layer.service.clone_from(&options.database);
    }
    if options.user.is_some() {
        layer.user.clone_from(&options.user);
    }
    if options.password.is_some() {
        layer.password.clone_from(&options.password);
    }
    if options.connect_timeout.is_some() {
        layer.connect_timeout = options.connect_timeout;
    }
    if options.statement_timeout.is_some() {
        layer.statement_timeout = options.statement_timeout;
    }
    Ok(layer)
}

fn url_layer(url: &str) -> Result<Layer, ConfigError> {
    let parsed = parse_url(url)?;
    let mut layer = Layer::from_pairs(
        parsed
            .query
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    )?;
    // The authority and path outrank the same keys repeated in the query string.
    if parsed.host.is_some() {
        layer.host = parsed.host;
    }
    if parsed.port.is_some() {
        layer.port = parsed.port;
    }
    if parsed.service.is_some() {
        layer.service = parsed.service;
    }
    if parsed.user.is_some() {
        layer.user = parsed.user;
    }
    if parsed.password.is_some() {
        layer.password = parsed.password;
    }
    Ok(layer)
}

/// An IP literal, a dotted name, or `localhost`. Anything else may be an alias.
pub(crate) fn is_literal_address(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok() || host.contains('.') || host.eq_ignore_ascii_case("localhost")
}

/// Merge every configuration source into one [`ConnectionConfiguration`].
///
/// Precedence, highest first: inline options, the URL, the `tnsnames.ora` alias named by the
/// host, `ojdbc.properties`, then built-in defaults. The directory reference (`TNS_ADMIN`)
/// is consumed here and is not part of the result.
///
/// # Errors
/// Returns [`SqlBridgeError::ConfigError`] for a malformed URL or option, a missing or
/// malformed alias, a directory that does not exist, or a missing host.
pub fn resolve(options: &ConnectOptions) -> Result<ConnectionConfiguration, SqlBridgeError> {
    Ok(resolve_layers(options)?)
}

fn resolve_layers(options: &ConnectOptions) -> Result<ConnectionConfiguration, ConfigError> {
    let mut inline = inline_layer(options)?;
    let mut url = match options.url.as_deref() {
        Some(url) => url_layer(url)?,
        None => Layer::default(),
    };

    let inline_dir = inline.take_directory();
    let url_dir = url.take_directory();
    let directory = options.tns_admin.clone().or(inline_dir).or(url_dir);

    let requested_host = inline.host.clone().or_else(|| url.host.clone());
    let mut resolved_host = requested_host.clone();
    let mut descriptor = Layer::default();
    let mut defaults = Layer::default();

    if let Some(dir) = directory.as_deref() {
        if !dir.is_dir() {
            return Err(ConfigError::DirectoryNotFound(dir.to_path_buf()));
        }

        let descriptor_path = dir.join(DESCRIPTOR_FILE);
        if let Some(alias) = requested_host.as_deref()
            && !is_literal_address(alias)
            && descriptor_path.is_file()
        {
            let file = DescriptorFile::load(&descriptor_path)?;
            let target = file.lookup(alias)?;
            tracing::debug!(
                alias,
                host = %target.host,
                port = ?target.port,
                "resolved connection alias"
            );
            resolved_host = Some(target.host.clone());
            descriptor.host = Some(target.host);
            descriptor.port = target.port;
            descriptor.protocol = target.protocol;
            descriptor.service = target.service;
        }

        let properties_path = dir.join(PROPERTIES_FILE);
        if properties_path.is_file() {
            let entries = properties::load_properties(&properties_path)?;
            defaults = Layer::from_pairs(
                entries
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            )?;
            defaults.take_directory();
        }
    }

    let layers = [&inline, &url, &descriptor, &defaults];
    let host = resolved_host
        .or_else(|| defaults.host.clone())
        .ok_or(ConfigError::MissingOption("host"))?;

    let mut extended: BTreeMap<String, String> = DEFAULT_PROPERTIES
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect();
    for layer in layers.iter().rev() {
        extended.extend(layer.extended.clone());
    }

    let config = ConnectionConfiguration {
        host,
        port: layers.iter().find_map(|l| l.port).unwrap_or(DEFAULT_PORT),
        protocol: layers
            .iter()
            .find_map(|l| l.protocol.clone())
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_owned()),
        service: layers.iter().find_map(|l| l.service.clone()),
        user: layers.iter().find_map(|l| l.user.clone()),
        password: layers.iter().find_map(|l| l.password.clone()),
        connect_timeout: layers.iter().find_map(|l| l.connect_timeout),
        statement_timeout: layers.iter().find_map(|l| l.statement_timeout),
        extended,
    };
    tracing::debug!(
        host = %config.host,
        port = config.port,
        service = ?config.service,
        "resolved connection configuration"
    );
    Ok(config)
}
