use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::{ConfigError, Result, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    /// Parses the leading `major[.minor[.patch]]` of a server version string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.split_whitespace().next()?;
        let mut parts = token.split(['.', '-']);
        let component = |part: &str| {
            let digits = part
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>();
            digits.parse::<u16>().ok()
        };
        let major = component(parts.next()?)?;
        let minor = parts.next().and_then(component).unwrap_or(0);
        let patch = parts.next().and_then(component).unwrap_or(0);
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

/// Connection parameters. `path` (or a `socket`) takes precedence over `host`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(alias = "username")]
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "dbname")]
    pub database: String,
    #[serde(alias = "unix_socket")]
    pub socket: Option<String>,
    /// Database file for the embedded backend.
    pub path: Option<String>,
    pub charset: Option<String>,
    pub profiler: bool,
    pub extra: BTreeMap<String, String>,
}

impl ConnectionConfig {
    /// Builds a config from a flat string map, keeping unrecognized keys in
    /// `extra`.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "host" => config.host = Some(value.clone()),
                "port" => {
                    let port =
                        value
                            .trim()
                            .parse()
                            .map_err(|_| ConfigError::InvalidConnectionOption {
                                key: key.clone(),
                                value: value.clone(),
                            })?;
                    config.port = Some(port);
                }
                "username" | "user" => config.user = Some(value.clone()),
                "password" => config.password = Some(value.clone()),
                "dbname" | "database" => config.database = value.clone(),
                "unix_socket" | "socket" => config.socket = Some(value.clone()),
                "path" => config.path = Some(value.clone()),
                "charset" => config.charset = Some(value.clone()),
                "profiler" => {
                    config.profiler = matches!(
                        value.trim().to_ascii_lowercase().as_str(),
                        "1" | "true" | "yes" | "on"
                    );
                }
                _ => {
                    config.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(config)
    }

    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn extra_duration_ms(&self, key: &str) -> Option<Duration> {
        self.extra(key)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
    }
}

/// Adapter behavior knobs that are not connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOptions {
    pub retry: RetryPolicy,
    pub ddl_cache_enabled: bool,
    pub auto_quote_identifiers: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            ddl_cache_enabled: true,
            auto_quote_identifiers: true,
        }
    }
}
