use super::dispatch::MigrationRequest;
use super::{EngineConfig, EngineHandle};
use crate::error::{RebalancerError, Result};
use crate::health::{components, HealthRegistry};
use crate::inventory::ContainerInventory;
use crate::load::LoadStateTable;
use crate::models::{ContainerRef, NodeId, NodeSpecs};
use crate::observability::{RebalancerMetrics, StructuredLogger};
use crate::policy::{TargetSelector, Thresholds};
use crate::sample::UsageSample;
use crate::source::SampleSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Load of one container as computed from one sample
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReading {
    pub container_id: String,
    pub node_id: NodeId,
    pub cpu_load_percent: f64,
    pub memory_load_percent: f64,
}

/// What happened to a decoded sample
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// No monitored container matched; no state was touched
    Unmatched,
    /// The matched container sits on a node without a capacity spec
    UnknownNode { container_id: String, node_id: NodeId },
    /// The node's capacity cannot be divided by
    InvalidCapacity { container_id: String, node_id: NodeId },
    Evaluated {
        reading: LoadReading,
        /// A threshold was crossed
        should_migrate: bool,
        /// Target of the migration request actually queued, if any
        queued_target: Option<NodeId>,
    },
}

/// Consumes samples, tracks per-container load and emits migration requests
///
/// The loop exclusively owns the load state table, so samples of one
/// container are always applied in arrival order.
pub struct IngestionLoop {
    source: Box<dyn SampleSource>,
    inventory: ContainerInventory,
    node_specs: Arc<NodeSpecs>,
    node_ids: Vec<NodeId>,
    thresholds: Thresholds,
    selector: Arc<dyn TargetSelector>,
    states: LoadStateTable,
    migrations: mpsc::Sender<MigrationRequest>,
    poll_timeout: Duration,
    health: HealthRegistry,
    metrics: RebalancerMetrics,
    logger: StructuredLogger,
}

impl IngestionLoop {
    pub(super) fn new(
        source: Box<dyn SampleSource>,
        handle: &EngineHandle,
        config: &EngineConfig,
        selector: Arc<dyn TargetSelector>,
        migrations: mpsc::Sender<MigrationRequest>,
    ) -> Self {
        let node_specs = handle.node_specs.clone();
        let node_ids = node_specs.keys().cloned().collect();

        Self {
            source,
            inventory: handle.inventory.clone(),
            node_specs,
            node_ids,
            thresholds: config.thresholds,
            selector,
            states: LoadStateTable::new(),
            migrations,
            poll_timeout: config.poll_timeout,
            health: handle.health.clone(),
            metrics: handle.metrics.clone(),
            logger: handle.logger.clone(),
        }
    }

    /// Run until shutdown or until the sample transport fails
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            poll_timeout_ms = self.poll_timeout.as_millis() as u64,
            "Starting sample ingestion loop"
        );
        self.health.set_ready(true).await;

        let poll_timeout = self.poll_timeout;
        loop {
            let polled = tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down sample ingestion loop");
                    return Ok(());
                }
                polled = self.source.poll(poll_timeout) => polled,
            };

            match polled {
                Ok(Some(payload)) => {
                    let start = Instant::now();
                    self.handle_payload(&payload);
                    self.metrics
                        .observe_sample_processing(start.elapsed().as_secs_f64());
                }
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "Sample transport failed, stopping ingestion");
                    self.health
                        .set_unhealthy(components::INGESTION, e.to_string())
                        .await;
                    return Err(e);
                }
            }
        }
    }

    /// Decode one raw payload and process it; malformed payloads are logged and skipped
    pub fn handle_payload(&mut self, payload: &[u8]) -> Option<SampleOutcome> {
        self.metrics.inc_samples_received();

        match UsageSample::from_json(payload) {
            Ok(sample) => Some(self.process_sample(&sample)),
            Err(e) => {
                let e = RebalancerError::from(e);
                warn!(error = %e, bytes = payload.len(), "Dropping sample");
                self.metrics.inc_samples_malformed();
                None
            }
        }
    }

    /// Match, compute load and decide on one sample
    pub fn process_sample(&mut self, sample: &UsageSample) -> SampleOutcome {
        let snapshot = self.inventory.snapshot();
        let Some(container) = ContainerInventory::find_match(&snapshot, &sample.container_name)
        else {
            debug!(container_name = %sample.container_name, "Sample matches no monitored container");
            self.metrics.inc_samples_unmatched();
            return SampleOutcome::Unmatched;
        };

        let Some(node) = self.node_specs.get(&container.node_id).copied() else {
            warn!(
                container_id = %container.id,
                node = %container.node_id,
                "Container is placed on a node without a capacity spec"
            );
            self.metrics.inc_samples_skipped();
            return SampleOutcome::UnknownNode {
                container_id: container.id,
                node_id: container.node_id,
            };
        };

        let computation = match self.states.apply(sample, &container, &node) {
            Ok(computation) => computation,
            Err(e) => {
                warn!(container_id = %container.id, error = %e, "Skipping sample");
                self.metrics.inc_samples_skipped();
                return SampleOutcome::InvalidCapacity {
                    container_id: container.id,
                    node_id: container.node_id,
                };
            }
        };

        let reading = LoadReading {
            container_id: container.id.clone(),
            node_id: container.node_id.clone(),
            cpu_load_percent: computation.cpu_load_percent,
            memory_load_percent: computation.memory_load_percent,
        };
        self.metrics.set_container_load(
            &reading.container_id,
            &reading.node_id,
            reading.cpu_load_percent,
            reading.memory_load_percent,
        );
        self.logger.log_load(
            &reading.container_id,
            &reading.node_id,
            reading.cpu_load_percent,
            reading.memory_load_percent,
        );

        let should_migrate = self
            .thresholds
            .should_migrate(reading.cpu_load_percent, reading.memory_load_percent);
        let queued_target = if should_migrate {
            self.request_migration(container, &reading)
        } else {
            None
        };

        SampleOutcome::Evaluated {
            reading,
            should_migrate,
            queued_target,
        }
    }

    /// Pick a target and hand the request to the dispatcher without waiting
    fn request_migration(&self, container: ContainerRef, reading: &LoadReading) -> Option<NodeId> {
        let Some(target) = self.selector.select_target(&container, &self.node_ids) else {
            warn!(container_id = %container.id, "No node available as migration target");
            return None;
        };

        self.logger.log_migration_triggered(
            &container.id,
            &container.node_id,
            &target,
            reading.cpu_load_percent,
            reading.memory_load_percent,
        );
        self.metrics.inc_migrations_triggered();

        let request = MigrationRequest {
            container,
            target: target.clone(),
            cpu_load_percent: reading.cpu_load_percent,
            memory_load_percent: reading.memory_load_percent,
        };

        match self.migrations.try_send(request) {
            Ok(()) => Some(target),
            Err(TrySendError::Full(request)) => {
                warn!(
                    container_id = %request.container.id,
                    target_node = %request.target,
                    "Migration queue full, dropping request"
                );
                self.metrics.inc_migrations_dropped();
                None
            }
            Err(TrySendError::Closed(request)) => {
                warn!(
                    container_id = %request.container.id,
                    "Migration dispatcher is gone, dropping request"
                );
                self.metrics.inc_migrations_dropped();
                None
            }
        }
    }

    /// Number of containers with load state
    pub fn tracked_containers(&self) -> usize {
        self.states.len()
    }

    pub fn is_tracking(&self, container_id: &str) -> bool {
        self.states.contains(container_id)
    }
}
