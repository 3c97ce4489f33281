//! Configuration management CLI commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use obcache_cache::redis::client::mask_redis_url;
use obcache_core::config::cache::BackendKind;
use obcache_core::error::AppError;

/// Arguments for config commands
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Validate configuration file
    Validate,
    /// Generate a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config/generated.toml")]
        output: String,
    },
}

/// Execute config commands
pub async fn execute(
    args: &ConfigArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    match &args.command {
        ConfigCommand::Show => {
            let config = super::load_config(config_path)?;
            output::print_item(&config, format);
        }
        ConfigCommand::Validate => {
            let config = match super::load_config(config_path) {
                Ok(config) => config,
                Err(e) => {
                    output::print_error(&format!("Configuration invalid: {}", e));
                    return Err(e);
                }
            };

            for (index, cache) in config.caches.iter().enumerate() {
                let label = cache.name.clone().unwrap_or_else(|| format!("#{index}"));
                if cache.backend == BackendKind::Redis {
                    if let Err(e) = cache.numeric_id() {
                        output::print_error(&format!("Cache {label}: {}", e.message));
                        return Err(e);
                    }
                }
            }

            output::print_success(&format!("Configuration '{}' is valid", config_path));
            println!("  Server: {}:{}", config.server.host, config.server.port);
            for cache in &config.caches {
                let name = cache.name.as_deref().unwrap_or("(anonymous)");
                match cache.backend {
                    BackendKind::Redis => {
                        let target = cache
                            .redis
                            .url
                            .as_deref()
                            .map(mask_redis_url)
                            .unwrap_or_else(|| format!("{}:{}", cache.redis.host, cache.redis.port));
                        println!(
                            "  Cache {name}: redis {target} (max age {}ms{})",
                            cache.max_age_ms,
                            if cache.redis.proxy_compat { ", proxy compat" } else { "" }
                        );
                    }
                    BackendKind::Memory => {
                        println!(
                            "  Cache {name}: memory (capacity {}, max age {}ms)",
                            cache.memory.max_capacity, cache.max_age_ms
                        );
                    }
                }
            }
        }
        ConfigCommand::Generate { output: out_path } => {
            let default_config = include_str!("../../../../config/default.toml");

            if let Some(parent) = std::path::Path::new(out_path).parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::internal(format!("Failed to create dir: {}", e)))?;
            }

            tokio::fs::write(out_path, default_config)
                .await
                .map_err(|e| AppError::internal(format!("Failed to write config: {}", e)))?;

            output::print_success(&format!("Default config written to '{}'", out_path));
        }
    }

    Ok(())
}
