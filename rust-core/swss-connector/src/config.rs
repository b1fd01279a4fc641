// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Connector configuration.
//!
//! Two resources drive a connector: the database map, which names each
//! logical database and its numeric index per connector variant, and the
//! [`ConnectorConfig`], which says where the store listens and how long the
//! retry and blocking-read protocol waits.
//!
//! Defaults:
//! - endpoint: Unix socket `/var/run/redis/redis.sock`
//! - reconnect wait: 10s, settling delay: 3s
//! - per-notification timeout: 10s, total data wait: 30s
//! - repeated-failure log threshold: 10 (suppressed again after 15)

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// Database map shipped with the crate.
const BUNDLED_DATABASE_MAP: &str = include_str!("../config/database.json");

/// Logical database names.
pub mod names {
    /// Application state written by the control-plane daemons.
    pub const APPL_DB: &str = "APPL_DB";
    /// ASIC state written by the syncer.
    pub const ASIC_DB: &str = "ASIC_DB";
    /// Port and queue counters.
    pub const COUNTERS_DB: &str = "COUNTERS_DB";
    /// Per-daemon log levels.
    pub const LOGLEVEL_DB: &str = "LOGLEVEL_DB";
    /// Running configuration.
    pub const CONFIG_DB: &str = "CONFIG_DB";
    /// PFC watchdog state.
    pub const PFC_WD_DB: &str = "PFC_WD_DB";
    /// Operational state published back by daemons.
    pub const STATE_DB: &str = "STATE_DB";
}

/// A connector flavour. Each variant owns one section of the database map
/// and a fixed set of database names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorVariant {
    /// The legacy database layout, without the configuration database.
    SonicV1,
    /// The current layout, including `CONFIG_DB` and `STATE_DB`.
    SonicV2,
}

impl ConnectorVariant {
    /// Section name of this variant in the database map file.
    pub fn section(self) -> &'static str {
        match self {
            ConnectorVariant::SonicV1 => "SonicV1Connector",
            ConnectorVariant::SonicV2 => "SonicV2Connector",
        }
    }

    /// The database names this variant is expected to expose.
    pub fn database_names(self) -> &'static [&'static str] {
        use names::*;
        match self {
            ConnectorVariant::SonicV1 => &[APPL_DB, ASIC_DB, COUNTERS_DB, LOGLEVEL_DB],
            ConnectorVariant::SonicV2 => &[
                APPL_DB,
                ASIC_DB,
                COUNTERS_DB,
                LOGLEVEL_DB,
                CONFIG_DB,
                PFC_WD_DB,
                STATE_DB,
            ],
        }
    }
}

/// One database entry of the map file: `{"db": <index>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    /// Numeric database index on the store instance.
    pub db: u32,
}

/// One connector section of the map file: `{"db_map": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorSection {
    /// Logical name to index.
    pub db_map: BTreeMap<String, DatabaseEntry>,
}

/// The whole database map file, keyed by connector section name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatabaseMap {
    sections: BTreeMap<String, ConnectorSection>,
}

impl DatabaseMap {
    /// The map compiled into the crate.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_DATABASE_MAP)
    }

    /// Parse a map from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a map file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SdkError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Extract and validate the databases of one connector variant.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Configuration`] if the section is missing or two
    /// names share a numeric index.
    pub fn databases(&self, variant: ConnectorVariant) -> Result<DbMap> {
        let section = self.sections.get(variant.section()).ok_or_else(|| {
            SdkError::Configuration(format!(
                "No '{}' section in database config",
                variant.section()
            ))
        })?;
        DbMap::new(section.db_map.iter().map(|(name, entry)| (name.clone(), entry.db)))
    }
}

/// A validated name → index map for one connector.
///
/// Indices are unique: construction fails otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbMap {
    indices: BTreeMap<String, u32>,
}

impl DbMap {
    /// Build a map, rejecting duplicate indices.
    pub fn new(entries: impl IntoIterator<Item = (String, u32)>) -> Result<Self> {
        let indices: BTreeMap<String, u32> = entries.into_iter().collect();
        let mut seen: HashMap<u32, &str> = HashMap::new();
        for (name, index) in &indices {
            if let Some(previous) = seen.insert(*index, name) {
                return Err(SdkError::Configuration(format!(
                    "Duplicate DB index {index} detected in configuration ('{previous}' and '{name}')"
                )));
            }
        }
        Ok(Self { indices })
    }

    /// Numeric index of `name`, or `None` if it is not configured.
    pub fn index(&self, name: &str) -> Option<u32> {
        self.indices.get(name).copied()
    }

    /// Configured database names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.indices.keys().map(String::as_str)
    }

    /// Number of configured databases.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True if no database is configured.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Where the store listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// TCP host and port.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// Local Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// Default TCP host. The store only accepts unauthenticated clients on
    /// loopback.
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    /// Default TCP port.
    pub const DEFAULT_PORT: u16 = 6379;
    /// Default Unix socket path.
    pub const DEFAULT_UNIX_SOCKET: &'static str = "/var/run/redis/redis.sock";

    /// The loopback TCP endpoint, which does not need root.
    pub fn loopback() -> Self {
        Endpoint::Tcp {
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(PathBuf::from(Self::DEFAULT_UNIX_SOCKET))
    }
}

#[cfg(feature = "redis-backend")]
impl From<&Endpoint> for swss_store::RedisAddress {
    fn from(endpoint: &Endpoint) -> Self {
        match endpoint {
            Endpoint::Tcp { host, port } => swss_store::RedisAddress::Tcp {
                host: host.clone(),
                port: *port,
            },
            Endpoint::Unix(path) => swss_store::RedisAddress::Unix(path.clone()),
        }
    }
}

/// Timing and logging knobs of the retry and blocking-read protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSettings {
    /// Wait before reconnecting after a connection failure.
    #[serde(with = "duration_secs")]
    pub connect_retry_wait: Duration,
    /// Settling delay after a matching notification, before re-reading.
    #[serde(with = "duration_secs")]
    pub data_retrieval_wait: Duration,
    /// Longest wait for any single notification message.
    #[serde(with = "duration_secs")]
    pub notification_timeout: Duration,
    /// Longest total wait for a matching notification.
    #[serde(with = "duration_secs")]
    pub maximum_data_wait: Duration,
    /// Consecutive failures after which failures are logged as errors.
    pub failure_log_threshold: u32,
    /// Consecutive failures after which logging drops back to warnings.
    pub failure_log_suppression: u32,
    /// Value for the store's `notify-keyspace-events` setting.
    pub keyspace_events: String,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            connect_retry_wait: Duration::from_secs(10),
            data_retrieval_wait: Duration::from_secs(3),
            notification_timeout: Duration::from_secs(10),
            maximum_data_wait: Duration::from_secs(30),
            failure_log_threshold: 10,
            failure_log_suppression: 15,
            keyspace_events: "KEA".to_string(),
        }
    }
}

/// Everything a connector needs besides its database map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Store location.
    pub endpoint: Endpoint,
    /// Retry and wait settings.
    pub settings: AccessSettings,
    /// Database map file. The bundled map is used when unset.
    pub database_config: Option<PathBuf>,
}

impl ConnectorConfig {
    /// Defaults overlaid with `SWSS_REDIS_UNIX_SOCKET`, or with
    /// `SWSS_REDIS_HOST` / `SWSS_REDIS_PORT`. `SWSS_DB_CONFIG` names a
    /// database map file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup("SWSS_REDIS_UNIX_SOCKET") {
            config.endpoint = Endpoint::Unix(PathBuf::from(path));
        } else if lookup("SWSS_REDIS_HOST").is_some() || lookup("SWSS_REDIS_PORT").is_some() {
            let host = lookup("SWSS_REDIS_HOST").unwrap_or_else(|| Endpoint::DEFAULT_HOST.to_string());
            let port = match lookup("SWSS_REDIS_PORT") {
                Some(raw) => raw.parse().map_err(|_| {
                    SdkError::Configuration(format!("Invalid SWSS_REDIS_PORT '{raw}'"))
                })?,
                None => Endpoint::DEFAULT_PORT,
            };
            config.endpoint = Endpoint::Tcp { host, port };
        }
        config.database_config = lookup("SWSS_DB_CONFIG").map(PathBuf::from);
        Ok(config)
    }

    /// The database map: the configured file if there is one, otherwise
    /// the bundled map.
    pub fn database_map(&self) -> Result<DatabaseMap> {
        match &self.database_config {
            Some(path) => DatabaseMap::load(path),
            None => DatabaseMap::bundled(),
        }
    }
}

/// Serialize a `Duration` as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
