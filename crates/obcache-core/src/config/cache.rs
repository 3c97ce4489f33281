//! Cache instance configuration.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::result::AppResult;

/// Which backend implementation serves a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Remote key-value store (Redis protocol).
    #[default]
    Redis,
    /// In-process store.
    Memory,
}

/// Raw cache id as written in configuration.
///
/// Accepts both `id = 3` and `id = "3"`; [`CacheInstanceConfig::numeric_id`]
/// decides whether it is usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheId {
    /// Integer literal.
    Number(i64),
    /// String literal.
    Text(String),
}

impl From<u32> for CacheId {
    fn from(id: u32) -> Self {
        Self::Number(i64::from(id))
    }
}

impl std::fmt::Display for CacheId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// One configured cache instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInstanceConfig {
    /// Registry name. Anonymous instances get `anon_<n>`.
    #[serde(default)]
    pub name: Option<String>,
    /// Backend implementation.
    #[serde(default)]
    pub backend: BackendKind,
    /// Numeric id used for the key namespace and the default database index.
    #[serde(default)]
    pub id: Option<CacheId>,
    /// Default time-to-live for written entries, in milliseconds.
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
    /// Remote store settings.
    #[serde(default)]
    pub redis: RemoteStoreConfig,
    /// In-memory store settings.
    #[serde(default)]
    pub memory: MemoryCacheConfig,
}

impl CacheInstanceConfig {
    /// Configuration for a remote-backed cache with the given id and defaults elsewhere.
    pub fn redis(id: impl Into<CacheId>) -> Self {
        Self {
            name: None,
            backend: BackendKind::Redis,
            id: Some(id.into()),
            max_age_ms: default_max_age_ms(),
            redis: RemoteStoreConfig::default(),
            memory: MemoryCacheConfig::default(),
        }
    }

    /// Configuration for an in-memory cache with defaults.
    pub fn memory() -> Self {
        Self {
            name: None,
            backend: BackendKind::Memory,
            id: None,
            max_age_ms: default_max_age_ms(),
            redis: RemoteStoreConfig::default(),
            memory: MemoryCacheConfig::default(),
        }
    }

    /// Validate and return the numeric id.
    ///
    /// The id doubles as a database index, so only non-negative integers
    /// are accepted.
    pub fn numeric_id(&self) -> AppResult<u32> {
        let parsed = match &self.id {
            Some(CacheId::Number(n)) => u32::try_from(*n).ok(),
            Some(CacheId::Text(s)) => s.trim().parse::<u32>().ok(),
            None => None,
        };

        parsed.ok_or_else(|| {
            let got = self
                .id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "none".to_string());
            AppError::configuration(format!("remote cache requires numeric id option, got: {got}"))
        })
    }
}

/// Remote store connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    /// Full connection URL. Takes precedence over `host`/`port`.
    #[serde(default)]
    pub url: Option<String>,
    /// Store host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Store port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Initial connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Explicit database index. Defaults to the cache id.
    #[serde(default)]
    pub database: Option<i64>,
    /// Shared/proxied keyspace mode: no key counts, no flush.
    #[serde(default)]
    pub proxy_compat: bool,
    /// Interval between readiness probes after a dropped connection, in milliseconds.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

impl RemoteStoreConfig {
    /// Database index to select for a cache with the given id.
    ///
    /// Proxies do not support `SELECT`, so no index is derived in compat mode.
    pub fn database_for(&self, id: u32) -> Option<i64> {
        match self.database {
            Some(db) => Some(db),
            None if self.proxy_compat => None,
            None => Some(i64::from(id)),
        }
    }
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            database: None,
            proxy_compat: false,
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

/// In-memory cache backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries in the cache.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_max_age_ms() -> u64 {
    60_000
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_reconnect_interval_ms() -> u64 {
    1000
}

fn default_max_capacity() -> u64 {
    10000
}
