//! Error taxonomy for the load-tracking and migration-decision engine

use crate::models::NodeId;
use thiserror::Error;

pub type Result<T, E = RebalancerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RebalancerError {
    /// Inventory unusable at construction; the loops must not start
    #[error("startup failed: {0:#}")]
    Startup(anyhow::Error),

    /// Inventory refresh failed; the previous container set is kept
    #[error("inventory fetch failed: {0:#}")]
    TransientFetch(anyhow::Error),

    #[error("node {node_id} has invalid capacity (cores={num_cpu_cores}, memory={memory_capacity_bytes} bytes)")]
    InvalidCapacity {
        node_id: NodeId,
        num_cpu_cores: u32,
        memory_capacity_bytes: u64,
    },

    #[error("migration of container {container_id} to {target} failed: {reason:#}")]
    MigrationDispatch {
        container_id: String,
        target: NodeId,
        reason: anyhow::Error,
    },

    /// The sample source can no longer deliver samples
    #[error("sample transport failed: {0:#}")]
    TransportFatal(anyhow::Error),

    #[error("malformed sample: {0}")]
    MalformedSample(#[from] SampleDecodeError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RebalancerError {
    pub fn startup(message: impl std::fmt::Display) -> Self {
        Self::Startup(anyhow::anyhow!("{}", message))
    }

    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::TransportFatal(anyhow::anyhow!("{}", message))
    }

    /// Only transport loss is allowed to end monitoring
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Startup(_) | Self::TransportFatal(_) | Self::InvalidConfig(_))
    }
}

/// Failure to decode a serialized usage sample
#[derive(Debug, Error)]
pub enum SampleDecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
}
