//! Cluster inventory: node capacities and monitored containers
//!
//! The [`InventoryProvider`] trait is the seam to the orchestrator. The
//! bundled implementation talks to an OSM NBI for service instances and
//! shells out to kubectl for node and pod details.

mod kubectl;
mod osm;
mod snapshot;

pub use kubectl::{parse_cpu_quantity, parse_memory_quantity, Kubectl, PodContainer, QuantityError};
pub use osm::{OsmConfig, OsmInventory};
pub use snapshot::ContainerInventory;

use crate::models::{ContainerRef, NodeId, NodeSpecs};
use anyhow::Result;

pub use async_trait::async_trait;

/// Source of node capacities and container placement
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Capacity of every cluster node, keyed by node id
    async fn node_specs(&self) -> Result<NodeSpecs>;

    /// Every monitored container together with its hosting node
    async fn containers(&self) -> Result<Vec<ContainerRef>>;

    /// Ask the orchestrator to move `container` to `target`
    async fn migrate(&self, container: &ContainerRef, target: &NodeId) -> Result<()>;
}
