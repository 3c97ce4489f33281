//! One-shot cache inspection.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use obcache_cache::inspect::{FlushStatus, InspectQuery, Inspector};
use obcache_cache::registry::CacheRegistry;
use obcache_core::error::AppError;

use crate::output::{self, CacheRow, OutputFormat};

/// Arguments for the inspect command
#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Include the values of this cache (if its backend can list them)
    #[arg(long)]
    pub detail: Option<String>,

    /// Flush this cache before reporting
    #[arg(long)]
    pub flush: Option<String>,

    /// Skip the flush confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// How long to wait for remote caches to connect, in milliseconds
    #[arg(long, default_value = "2000")]
    pub wait_ms: u64,
}

/// Execute the inspect command
pub async fn execute(
    args: &InspectArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let registry = Arc::new(obcache_cache::build_registry(&config.caches)?);

    if !wait_until_ready(&registry, Duration::from_millis(args.wait_ms)).await {
        output::print_warning("Some caches are not ready; their operations are still queued");
    }

    if let Some(name) = &args.flush {
        if registry.get(name).is_none() {
            return Err(AppError::not_found(format!("No cache named '{name}'")));
        }

        if !args.yes {
            let confirm = dialoguer::Confirm::new()
                .with_prompt(format!("Flush every entry of cache '{name}'?"))
                .default(false)
                .interact()
                .map_err(|e| AppError::internal(format!("Input error: {}", e)))?;

            if !confirm {
                println!("Cancelled.");
                return Ok(());
            }
        }
    }

    let inspector = Inspector::new(
        Arc::clone(&registry),
        Duration::from_millis(config.server.flush_timeout_ms),
    );
    let query = InspectQuery {
        detail: args.detail.clone(),
        flush: args.flush.clone(),
    };
    let snapshot = inspector.view(&query, query.flush.is_some()).await?;

    match format {
        OutputFormat::Json => output::print_item(&snapshot, format),
        OutputFormat::Table => {
            output::print_kv("Host", &snapshot.host);
            output::print_kv("PID", &snapshot.pid.to_string());
            println!();

            let rows: Vec<CacheRow> = snapshot.data.iter().map(CacheRow::from).collect();
            output::print_list(&rows, format);

            for report in &snapshot.data {
                if let Some(values) = &report.values {
                    println!();
                    println!("Values of '{}':", report.name);
                    output::print_item(values, OutputFormat::Json);
                }
            }
        }
    }

    if let Some(name) = &args.flush {
        report_flush(name, snapshot.flush_status, config.server.flush_timeout_ms);
    }

    Ok(())
}

/// Tell the user what became of a requested flush.
fn report_flush(name: &str, status: Option<FlushStatus>, timeout_ms: u64) {
    match status {
        Some(FlushStatus::Completed) => {
            output::print_success(&format!("Cache '{name}' flushed"));
        }
        Some(FlushStatus::Failed) => {
            output::print_error(&format!("Flush of cache '{name}' failed; see the log"));
        }
        Some(FlushStatus::Running) => {
            output::print_warning(&format!(
                "Flush of cache '{name}' requested but not confirmed within {timeout_ms}ms"
            ));
        }
        None => {
            output::print_warning(&format!("Cache '{name}' was not flushed"));
        }
    }
}

/// Poll until every cache reports ready. Returns `false` on timeout.
async fn wait_until_ready(registry: &CacheRegistry, wait: Duration) -> bool {
    let all_ready = || registry.entries().iter().all(|(_, c)| c.is_ready());

    tokio::time::timeout(wait, async {
        while !all_ready() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok()
}
