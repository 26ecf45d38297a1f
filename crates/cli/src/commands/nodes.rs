//! Node listing and detail commands

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, NodeDetail, NodeSummary};
use crate::output::{
    color_status, format_resource_list, format_timestamp, format_utilization, print_json,
    print_table, print_warning, resource_cell, OutputFormat,
};

/// Row for nodes table
#[derive(Tabled, Serialize)]
struct NodeRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Instance Type")]
    instance_type: String,
    #[tabled(rename = "Pods")]
    pods: usize,
    #[tabled(rename = "CPU Avail")]
    cpu_available: String,
    #[tabled(rename = "Mem Avail")]
    memory_available: String,
    #[tabled(rename = "CPU Used")]
    cpu_utilization: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&NodeSummary> for NodeRow {
    fn from(node: &NodeSummary) -> Self {
        Self {
            name: node.name.clone(),
            status: color_status(&node.status),
            instance_type: node.instance_type.clone().unwrap_or_else(|| "-".to_string()),
            pods: node.pod_count,
            cpu_available: resource_cell(&node.available, "cpu"),
            memory_available: resource_cell(&node.available, "memory"),
            cpu_utilization: format_utilization(
                node.pod_total_requests.get("cpu").copied().unwrap_or(0),
                node.allocatable.get("cpu").copied().unwrap_or(0),
            ),
            created: format_timestamp(node.created_at),
        }
    }
}

/// Row for pods on a node
#[derive(Tabled)]
struct NodePodRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Requests")]
    requests: String,
    #[tabled(rename = "Daemon Set")]
    daemon_set: String,
}

/// List tracked nodes
pub async fn list_nodes(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let nodes: Vec<NodeSummary> = client.get("api/v1/nodes").await?;

    match format {
        OutputFormat::Json => print_json(&nodes)?,
        OutputFormat::Table => {
            let rows: Vec<NodeRow> = nodes.iter().map(NodeRow::from).collect();
            print_table(&rows, format);
            if !rows.is_empty() {
                println!("\nTotal: {} nodes", rows.len());
            }
        }
    }

    Ok(())
}

/// Show a node and its pods
pub async fn show_node(client: &ApiClient, name: &str, format: OutputFormat) -> Result<()> {
    let path = format!("api/v1/nodes/{}", name);
    let detail: NodeDetail = client.get(&path).await?;

    match format {
        OutputFormat::Json => print_json(&detail)?,
        OutputFormat::Table => {
            let node = &detail.node;
            println!("{}", "Node".bold());
            println!("{}", "=".repeat(60));
            println!("Name:                   {}", node.name.cyan());
            println!("UID:                    {}", node.uid);
            println!("Status:                 {}", color_status(&node.status));
            println!(
                "Instance Type:          {}",
                node.instance_type.as_deref().unwrap_or("-")
            );
            println!(
                "Capacity Type:          {}",
                node.capacity_type.as_deref().unwrap_or("-")
            );
            println!("Created:                {}", format_timestamp(node.created_at));
            println!(
                "Observed:               {}",
                format_timestamp(Some(node.observed_at))
            );
            println!();

            println!("{}", "Resources".bold());
            println!("{}", "-".repeat(60));
            println!("Capacity:               {}", format_resource_list(&node.capacity));
            println!(
                "Allocatable:            {}",
                format_resource_list(&node.allocatable)
            );
            println!("Available:              {}", format_resource_list(&node.available));
            println!(
                "Requests:               {}",
                format_resource_list(&node.pod_total_requests)
            );
            println!(
                "Limits:                 {}",
                format_resource_list(&node.pod_total_limits)
            );
            println!(
                "Daemon Set Requests:    {}",
                format_resource_list(&node.daemon_set_requested)
            );
            println!(
                "Daemon Set Limits:      {}",
                format_resource_list(&node.daemon_set_limits)
            );
            if !node.volume_limits.is_empty() {
                let limits = node
                    .volume_limits
                    .iter()
                    .map(|(driver, count)| format!("{}={}", driver, count))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("Volume Limits:          {}", limits);
            }
            println!();

            if detail.pods.is_empty() {
                print_warning("No pods on this node");
                return Ok(());
            }

            let rows: Vec<NodePodRow> = detail
                .pods
                .iter()
                .map(|p| NodePodRow {
                    namespace: p.namespace.clone(),
                    name: p.name.clone(),
                    phase: color_status(p.phase.as_deref().unwrap_or("Unknown")),
                    requests: format_resource_list(&p.requests),
                    daemon_set: if p.daemon_set { "yes" } else { "no" }.to_string(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} pods", detail.pods.len());
        }
    }

    Ok(())
}
