//! Core data models for the rebalancer

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node hostname as reported by the cluster
pub type NodeId = String;

/// Node capacity snapshot, keyed by node id
pub type NodeSpecs = BTreeMap<NodeId, NodeSpec>;

/// Capacity of a cluster node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub num_cpu_cores: u32,
    pub memory_capacity_bytes: u64,
}

impl NodeSpec {
    pub fn new(num_cpu_cores: u32, memory_capacity_bytes: u64) -> Self {
        Self {
            num_cpu_cores,
            memory_capacity_bytes,
        }
    }

    /// Both capacity fields must be non-zero for load to be defined
    pub fn is_valid(&self) -> bool {
        self.num_cpu_cores > 0 && self.memory_capacity_bytes > 0
    }
}

/// A monitored container and the service instance that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    /// Runtime container id, expected to appear inside sample container names
    pub id: String,
    /// Node currently hosting the container
    pub node_id: NodeId,
    pub ns_id: String,
    pub vnf_id: String,
    pub kdu_id: String,
}

impl ContainerRef {
    /// Whether a sample's reported container name refers to this container
    pub fn matches(&self, container_name: &str) -> bool {
        !self.id.is_empty() && container_name.contains(self.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str) -> ContainerRef {
        ContainerRef {
            id: id.to_string(),
            node_id: "n1".to_string(),
            ns_id: "ns".to_string(),
            vnf_id: "vnf".to_string(),
            kdu_id: "kdu".to_string(),
        }
    }

    #[test]
    fn test_node_spec_validity() {
        assert!(NodeSpec::new(2, 1024).is_valid());
        assert!(!NodeSpec::new(0, 1024).is_valid());
        assert!(!NodeSpec::new(2, 0).is_valid());
    }

    #[test]
    fn test_container_matches_by_substring() {
        let c = container("abc123");
        assert!(c.matches("/kubepods/besteffort/pod42/abc123"));
        assert!(c.matches("abc123"));
        assert!(!c.matches("/kubepods/besteffort/pod42/def456"));
    }

    #[test]
    fn test_empty_container_id_never_matches() {
        assert!(!container("").matches("anything"));
    }
}
