//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

use obcache_cache::inspect::CacheReport;

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Cache display row
#[derive(Debug, Serialize, Tabled)]
pub struct CacheRow {
    /// Name
    name: String,
    /// Size
    size: u64,
    /// Keys
    keycount: String,
    /// Hit rate
    hitrate: String,
    /// Resets
    resets: u64,
    /// Pending
    pending: usize,
}

impl From<&CacheReport> for CacheRow {
    fn from(report: &CacheReport) -> Self {
        Self {
            name: report.name.clone(),
            size: report.size,
            keycount: if report.keycount < 0 {
                "n/a".to_string()
            } else {
                report.keycount.to_string()
            },
            hitrate: format!("{}%", report.hitrate),
            resets: report.resets,
            pending: report.pending,
        }
    }
}

/// Print a list of items in the selected format
pub fn print_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No caches configured.");
            } else {
                let table = Table::new(items).to_string();
                println!("{}", table);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
            println!("{}", json);
        }
    }
}

/// Print a single item in the selected format
pub fn print_item<T: Serialize + std::fmt::Debug>(item: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!("{:#?}", item);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(item).unwrap_or_else(|_| "{}".to_string());
            println!("{}", json);
        }
    }
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("⚠ {}", msg);
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {}", msg);
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<24} {}", format!("{}:", key), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_from_report() {
        let report = CacheReport {
            name: "shared".to_string(),
            size: 0,
            keycount: -1,
            hitrate: 90,
            resets: 2,
            pending: 0,
            values: None,
        };
        let row = CacheRow::from(&report);
        assert_eq!(row.keycount, "n/a");
        assert_eq!(row.hitrate, "90%");

        let table = Table::new([row]).to_string();
        assert!(table.contains("shared"));
    }
}
