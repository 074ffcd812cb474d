//! Node and container inventory commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, Container, Node, RefreshResponse};
use crate::output::{format_bytes, print_json, print_success, print_table, OutputFormat};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "CPU Cores")]
    cores: u32,
    #[tabled(rename = "Memory")]
    memory: String,
}

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Container")]
    id: String,
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "NS")]
    ns_id: String,
    #[tabled(rename = "VNF")]
    vnf_id: String,
    #[tabled(rename = "KDU")]
    kdu_id: String,
}

/// List nodes with their capacity
pub async fn list_nodes(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let nodes: Vec<Node> = client.get("api/v1/nodes").await?;

    let rows: Vec<NodeRow> = nodes
        .iter()
        .map(|n| NodeRow {
            node: n.node_id.clone(),
            cores: n.num_cpu_cores,
            memory: format_bytes(n.memory_capacity_bytes),
        })
        .collect();
    print_table(rows, &nodes, format);

    Ok(())
}

/// List monitored containers, optionally only those on one node
pub async fn list_containers(
    client: &ApiClient,
    node: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let containers: Vec<Container> = client.get("api/v1/containers").await?;
    let containers = filter_by_node(containers, node);

    let rows: Vec<ContainerRow> = containers
        .iter()
        .map(|c| ContainerRow {
            id: c.id.clone(),
            node: c.node_id.clone(),
            ns_id: c.ns_id.clone(),
            vnf_id: c.vnf_id.clone(),
            kdu_id: c.kdu_id.clone(),
        })
        .collect();
    print_table(rows, &containers, format);

    if matches!(format, OutputFormat::Table) && !containers.is_empty() {
        println!("\nTotal: {} containers", containers.len());
    }

    Ok(())
}

/// Trigger an inventory refresh
pub async fn refresh(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: RefreshResponse = client.post("api/v1/containers/refresh").await?;

    match format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Table => print_success(&format!(
            "Inventory refreshed: {} containers monitored",
            result.containers.to_string().bold()
        )),
    }

    Ok(())
}

fn filter_by_node(containers: Vec<Container>, node: Option<&str>) -> Vec<Container> {
    match node {
        Some(node) => containers.into_iter().filter(|c| c.node_id == node).collect(),
        None => containers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, node_id: &str) -> Container {
        Container {
            id: id.to_string(),
            node_id: node_id.to_string(),
            ns_id: "ns".to_string(),
            vnf_id: "vnf".to_string(),
            kdu_id: "kdu".to_string(),
        }
    }

    #[test]
    fn test_filter_by_node() {
        let containers = vec![container("a", "edge-1"), container("b", "edge-2")];

        let filtered = filter_by_node(containers.clone(), Some("edge-2"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "b");

        assert_eq!(filter_by_node(containers, None).len(), 2);
    }
}
