//! HTTP server configuration.

use serde::{Deserialize, Serialize};

/// Introspection server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long a flush request waits for the store before answering, in milliseconds.
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_ms: u64,
    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            flush_timeout_ms: default_flush_timeout(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_flush_timeout() -> u64 {
    5000
}

fn default_shutdown_grace() -> u64 {
    30
}
