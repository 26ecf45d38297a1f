//! Agent health command

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, print_json, OutputFormat};

/// Row for components table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Synced")]
    synced: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Serialize)]
struct HealthReport {
    health: HealthResponse,
    readiness: ReadinessResponse,
}

/// Show health and readiness of the agent
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (bool, HealthResponse) = client.get_status("healthz").await?;
    let (_, readiness): (bool, ReadinessResponse) = client.get_status("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&HealthReport { health, readiness })?,
        OutputFormat::Table => {
            println!("{}", "Agent Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status:                 {}", color_status(&health.status));
            let ready = if readiness.ready {
                "yes".green().to_string()
            } else {
                "no".red().to_string()
            };
            println!("Ready:                  {}", ready);
            if let Some(reason) = &readiness.reason {
                println!("Reason:                 {}", reason);
            }
            println!();

            let mut components: Vec<_> = health.components.iter().collect();
            components.sort_by(|a, b| a.0.cmp(b.0));
            let rows: Vec<ComponentRow> = components
                .into_iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    synced: if c.synced { "yes" } else { "no" }.to_string(),
                    message: c.message.clone().unwrap_or_else(|| "-".to_string()),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
