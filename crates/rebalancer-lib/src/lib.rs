//! Edge workload rebalancer library
//!
//! This crate provides the core functionality for:
//! - Decoding container usage samples
//! - Per-container CPU and memory load tracking
//! - Threshold-based migration decisions
//! - Cluster inventory through OSM and kubectl
//! - Health checks, observability and the HTTP API

pub mod api;
pub mod engine;
pub mod error;
pub mod health;
pub mod inventory;
pub mod load;
pub mod models;
pub mod observability;
pub mod policy;
pub mod sample;
pub mod source;

pub use engine::{Engine, EngineBuilder, EngineConfig, EngineHandle, RunningEngine, SampleOutcome};
pub use error::{RebalancerError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{RebalancerMetrics, StructuredLogger};
pub use policy::{RandomTargetSelector, TargetSelector, Thresholds};
pub use sample::UsageSample;
