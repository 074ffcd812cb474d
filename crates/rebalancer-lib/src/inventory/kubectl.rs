//! kubectl-driven cluster introspection
//!
//! Runs `kubectl ... -o=json` and decodes the small subset of the node and
//! pod objects the rebalancer needs.

use crate::models::{NodeSpec, NodeSpecs};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Invalid Kubernetes resource quantity
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid quantity {0:?}")]
    Invalid(String),
    #[error("quantity {0:?} overflows")]
    Overflow(String),
}

/// Parse a CPU quantity ("4", "3500m") into whole cores, rounding down
///
/// A non-zero allocation below one core ("500m") counts as one core.
pub fn parse_cpu_quantity(value: &str) -> Result<u32, QuantityError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(QuantityError::Empty);
    }

    if let Some(millis) = value.strip_suffix('m') {
        let millis: u64 = millis
            .parse()
            .map_err(|_| QuantityError::Invalid(value.to_string()))?;
        let cores = match millis {
            1..=999 => 1,
            _ => millis / 1000,
        };
        return u32::try_from(cores).map_err(|_| QuantityError::Overflow(value.to_string()));
    }

    value
        .parse::<u32>()
        .map_err(|_| QuantityError::Invalid(value.to_string()))
}

/// Parse a memory quantity ("16283740Ki", "8Gi", "512M", "1048576") into bytes
pub fn parse_memory_quantity(value: &str) -> Result<u64, QuantityError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(QuantityError::Empty);
    }

    const SUFFIXES: &[(&str, u64)] = &[
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];

    let (digits, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, multiplier)| value.strip_suffix(suffix).map(|d| (d, *multiplier)))
        .unwrap_or((value, 1));

    let amount: u64 = digits
        .parse()
        .map_err(|_| QuantityError::Invalid(value.to_string()))?;

    amount
        .checked_mul(multiplier)
        .ok_or_else(|| QuantityError::Overflow(value.to_string()))
}

#[derive(Debug, Deserialize)]
struct List<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Node {
    metadata: NodeMetadata,
    status: NodeStatus,
}

#[derive(Debug, Deserialize)]
struct NodeMetadata {
    name: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct NodeStatus {
    allocatable: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodSpec {
    #[serde(rename = "nodeName", default)]
    node_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(rename = "containerStatuses", default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(rename = "containerID", default)]
    container_id: Option<String>,
}

/// A running container as seen by kubectl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodContainer {
    pub container_id: String,
    pub node_name: String,
}

/// kubectl invocation settings
#[derive(Debug, Clone)]
pub struct Kubectl {
    command: PathBuf,
    kubeconfig: PathBuf,
}

impl Kubectl {
    pub fn new(command: impl Into<PathBuf>, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            kubeconfig: kubeconfig.into(),
        }
    }

    pub fn kubeconfig(&self) -> &std::path::Path {
        &self.kubeconfig
    }

    /// Capacity of every node, keyed by its hostname label
    pub async fn node_specs(&self) -> Result<NodeSpecs> {
        let nodes: List<Node> = self.get_json(&["get", "nodes", "-o=json"]).await?;
        Ok(Self::node_specs_from(nodes))
    }

    /// Containers of the pods labelled with `ns_id` in `namespace`
    pub async fn ns_containers(&self, namespace: &str, ns_id: &str) -> Result<Vec<PodContainer>> {
        let namespace_arg = format!("--namespace={}", namespace);
        let selector = format!("ns_id={}", ns_id);
        let pods: List<Pod> = self
            .get_json(&[&namespace_arg, "get", "pods", "-l", &selector, "-o=json"])
            .await?;
        Ok(Self::containers_from(pods))
    }

    fn node_specs_from(nodes: List<Node>) -> NodeSpecs {
        let mut specs = NodeSpecs::new();

        for node in nodes.items {
            let node_id = node
                .metadata
                .labels
                .get(HOSTNAME_LABEL)
                .cloned()
                .unwrap_or(node.metadata.name);

            let cores = node.status.allocatable.get("cpu").map(|v| parse_cpu_quantity(v));
            let memory = node
                .status
                .allocatable
                .get("memory")
                .map(|v| parse_memory_quantity(v));

            match (cores, memory) {
                (Some(Ok(cores)), Some(Ok(memory))) => {
                    specs.insert(node_id, NodeSpec::new(cores, memory));
                }
                (cores, memory) => {
                    warn!(
                        node = %node_id,
                        cpu = ?cores,
                        memory = ?memory,
                        "Skipping node with unreadable allocatable resources"
                    );
                }
            }
        }

        specs
    }

    fn containers_from(pods: List<Pod>) -> Vec<PodContainer> {
        let mut containers = Vec::new();

        for pod in pods.items {
            let Some(node_name) = pod.spec.node_name else {
                // Not scheduled yet
                continue;
            };
            for status in pod.status.container_statuses {
                if let Some(id) = status.container_id.as_deref().and_then(short_container_id) {
                    containers.push(PodContainer {
                        container_id: id,
                        node_name: node_name.clone(),
                    });
                }
            }
        }

        containers
    }

    async fn get_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let kubeconfig_arg = format!("--kubeconfig={}", self.kubeconfig.display());
        debug!(command = %self.command.display(), ?args, "Running kubectl");

        let output = Command::new(&self.command)
            .arg(&kubeconfig_arg)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.command.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "kubectl {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("Failed to parse output of kubectl {}", args.join(" ")))
    }
}

/// "containerd://0f3c..." -> "0f3c..."
fn short_container_id(raw: &str) -> Option<String> {
    raw.trim_matches('"')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
