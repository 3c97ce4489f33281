//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod app;
pub mod cache;
pub mod logging;

use serde::{Deserialize, Serialize};

use self::app::ServerConfig;
use self::cache::CacheInstanceConfig;
use self::logging::LoggingConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Introspection server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Cache instances to build and register at startup.
    #[serde(default)]
    pub caches: Vec<CacheInstanceConfig>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error; environment variables prefixed with
    /// `OBCACHE__` are layered on top (e.g. `OBCACHE__SERVER__PORT=9000`).
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("OBCACHE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cache::{BackendKind, CacheId};

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            port = 9090

            [logging]
            format = "pretty"

            [[caches]]
            name = "sessions"
            id = 3
            max_age_ms = 2000

            [caches.redis]
            url = "redis://cache.internal:6380"
            proxy_compat = true

            [[caches]]
            name = "pages"
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.caches.len(), 2);

        let sessions = &config.caches[0];
        assert_eq!(sessions.name.as_deref(), Some("sessions"));
        assert_eq!(sessions.id, Some(CacheId::Number(3)));
        assert_eq!(sessions.max_age_ms, 2000);
        assert!(sessions.redis.proxy_compat);
        assert_eq!(
            sessions.redis.url.as_deref(),
            Some("redis://cache.internal:6380")
        );

        assert_eq!(config.caches[1].backend, BackendKind::Memory);
        assert_eq!(config.caches[1].memory.max_capacity, 10000);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.flush_timeout_ms, 5000);
        assert!(config.caches.is_empty());
    }
}
