//! Unbound pod listing command

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, PodSummary};
use crate::output::{
    color_status, format_resource_list, format_timestamp, print_json, print_table, OutputFormat,
};

/// Row for unbound pods table
#[derive(Tabled, Serialize)]
struct PodRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Requests")]
    requests: String,
    #[tabled(rename = "Created")]
    created: String,
}

/// List pods waiting for a node
pub async fn list_unbound_pods(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let pods: Vec<PodSummary> = client.get("api/v1/pods/unbound").await?;

    match format {
        OutputFormat::Json => print_json(&pods)?,
        OutputFormat::Table => {
            let rows: Vec<PodRow> = pods
                .iter()
                .map(|p| PodRow {
                    namespace: p.namespace.clone(),
                    name: p.name.clone(),
                    phase: color_status(p.phase.as_deref().unwrap_or("Unknown")),
                    requests: format_resource_list(&p.requests),
                    created: format_timestamp(p.created_at),
                })
                .collect();
            print_table(&rows, format);
            if !rows.is_empty() {
                println!("\nTotal: {} unbound pods", rows.len());
            }
        }
    }

    Ok(())
}
