//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

use crate::client::ResourceList;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print any value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format memory given in milli-bytes as a human-readable string
pub fn format_memory(milli_bytes: i64) -> String {
    const KI: f64 = 1024.0;
    const MI: f64 = KI * 1024.0;
    const GI: f64 = MI * 1024.0;

    let bytes = milli_bytes as f64 / 1000.0;
    let sign = if bytes < 0.0 { "-" } else { "" };
    let abs = bytes.abs();

    if abs >= GI {
        format!("{sign}{:.2}Gi", abs / GI)
    } else if abs >= MI {
        format!("{sign}{:.2}Mi", abs / MI)
    } else if abs >= KI {
        format!("{sign}{:.2}Ki", abs / KI)
    } else {
        format!("{sign}{}B", abs.round() as i64)
    }
}

/// Format millicores as a human-readable string
pub fn format_cpu(millicores: i64) -> String {
    if millicores.abs() >= 1000 {
        format!("{:.1}", millicores as f64 / 1000.0)
    } else {
        format!("{}m", millicores)
    }
}

/// Format an amount for a named resource
pub fn format_resource(name: &str, milli: i64) -> String {
    match name {
        "cpu" => format_cpu(milli),
        "memory" | "ephemeral-storage" => format_memory(milli),
        _ if milli % 1000 == 0 => (milli / 1000).to_string(),
        _ => format!("{}m", milli),
    }
}

/// Amount of a resource from a list, formatted; "-" when the key is absent
pub fn resource_cell(list: &ResourceList, name: &str) -> String {
    list.get(name)
        .map(|v| format_resource(name, *v))
        .unwrap_or_else(|| "-".to_string())
}

/// Render a resource list as "name=value" pairs
pub fn format_resource_list(list: &ResourceList) -> String {
    if list.is_empty() {
        return "-".to_string();
    }
    list.iter()
        .map(|(name, milli)| format!("{}={}", name, format_resource(name, *milli)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Used share of an allocatable amount, as a percentage
pub fn format_utilization(used: i64, allocatable: i64) -> String {
    if allocatable <= 0 {
        return "-".to_string();
    }
    format!("{:.0}%", used as f64 / allocatable as f64 * 100.0)
}

/// Format an optional timestamp, "never" when absent
pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "ready" | "healthy" | "running" | "succeeded" => status.green().to_string(),
        "cordoned" | "degraded" | "pending" => status.yellow().to_string(),
        "notready" | "unhealthy" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}
