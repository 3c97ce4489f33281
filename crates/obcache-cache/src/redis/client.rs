//! Redis connection setup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use obcache_core::config::cache::RemoteStoreConfig;
use obcache_core::error::{AppError, ErrorKind};
use obcache_core::result::AppResult;

use super::operations::RedisConnection;
use crate::remote::connection::{RemoteConnection, RemoteConnector};

/// Opens connections to one Redis database.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    /// Connection URL with the database index applied.
    url: String,
    /// Upper bound on the initial connection attempt.
    connect_timeout: Duration,
}

impl RedisConnector {
    /// Build a connector from store configuration.
    ///
    /// `database` overrides whatever index the URL carries.
    pub fn new(config: &RemoteStoreConfig, database: Option<i64>) -> Self {
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| format!("redis://{}:{}", config.host, config.port));

        let url = match database {
            Some(db) => with_database(&base, db),
            None => base,
        };

        Self {
            url,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    /// Connection URL in use (may contain credentials).
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteConnector for RedisConnector {
    async fn connect(&self) -> AppResult<Arc<dyn RemoteConnection>> {
        info!(url = %mask_redis_url(&self.url), "Connecting to Redis");

        let client = Client::open(self.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Invalid Redis URL", e)
        })?;

        let conn = tokio::time::timeout(self.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                AppError::connection(format!(
                    "Timed out connecting to Redis after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                AppError::with_source(ErrorKind::Connection, "Failed to connect to Redis", e)
            })?;

        info!("Successfully connected to Redis");
        Ok(Arc::new(RedisConnection::new(conn)))
    }

    fn describe(&self) -> String {
        mask_redis_url(&self.url)
    }
}

/// Point a Redis URL at database `db`.
///
/// TCP URLs carry the index as the path; unix-socket URLs take a `db`
/// query parameter.
pub fn with_database(url: &str, db: i64) -> String {
    let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
    let scheme = &url[..scheme_end];

    if scheme.starts_with("unix") || scheme.starts_with("redis+unix") {
        let separator = if url.contains('?') { '&' } else { '?' };
        return format!("{url}{separator}db={db}");
    }

    let rest = &url[scheme_end..];
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let query = rest[authority_end..]
        .find('?')
        .map(|q| &rest[authority_end + q..])
        .unwrap_or("");

    format!("{scheme}{authority}/{db}{query}")
}

/// Mask password in Redis URL for safe logging.
pub fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos > scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    url.to_string()
}
