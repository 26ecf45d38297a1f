//! Cluster summary command

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, ClusterSummary};
use crate::output::{
    format_resource_list, format_timestamp, format_utilization, print_json, OutputFormat,
};

/// Show cluster-wide totals
pub async fn show_summary(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let summary: ClusterSummary = client.get("api/v1/cluster").await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Cluster Summary".bold());
            println!("{}", "=".repeat(50));
            println!(
                "Nodes:                  {} ({} ready)",
                summary.node_count, summary.ready_node_count
            );
            println!("Bound Pods:             {}", summary.bound_pod_count);
            println!("Unbound Pods:           {}", summary.unbound_pod_count);
            println!();

            println!("{}", "Resources".bold());
            println!("{}", "-".repeat(50));
            println!(
                "Allocatable:            {}",
                format_resource_list(&summary.allocatable)
            );
            println!(
                "Requested:              {}",
                format_resource_list(&summary.pod_total_requests)
            );
            println!(
                "Daemon Set Requested:   {}",
                format_resource_list(&summary.daemon_set_requested)
            );
            println!(
                "CPU Utilization:        {}",
                format_utilization(
                    summary.pod_total_requests.get("cpu").copied().unwrap_or(0),
                    summary.allocatable.get("cpu").copied().unwrap_or(0),
                )
            );
            println!();

            println!("{}", "Activity".bold());
            println!("{}", "-".repeat(50));
            println!(
                "Last Node Created:      {}",
                format_timestamp(summary.last_node_creation)
            );
            println!(
                "Last Node Deleted:      {}",
                format_timestamp(summary.last_node_deletion)
            );
            println!(
                "Last Updated:           {}",
                format_timestamp(summary.last_updated)
            );

            if let Some(startup) = &summary.startup {
                println!();
                println!("{}", "Node Startup".bold());
                println!("{}", "-".repeat(50));
                println!("Observed:               {}", startup.count);
                println!("Average:                {:.1}s", startup.average_seconds);
                println!("Shortest:               {:.1}s", startup.shortest_seconds);
                println!("Longest:                {:.1}s", startup.longest_seconds);
            }
        }
    }

    Ok(())
}
