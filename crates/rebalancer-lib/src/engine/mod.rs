//! Load-tracking and migration-decision engine
//!
//! Three tasks run once the engine is started:
//! - the ingestion loop, which owns the per-container load state and turns
//!   samples into migration decisions
//! - the refresh loop, which periodically swaps in a fresh container set
//! - the migration dispatcher, which drains a bounded queue of migration
//!   requests so a slow orchestrator never stalls ingestion

mod dispatch;
mod ingest;
mod refresh;


pub use dispatch::{MigrationDispatcher, MigrationRequest};
pub use ingest::{IngestionLoop, LoadReading, SampleOutcome};
pub use refresh::RefreshLoop;

use crate::error::{RebalancerError, Result};
use crate::health::{components, HealthRegistry};
use crate::inventory::{ContainerInventory, InventoryProvider};
use crate::models::{ContainerRef, NodeId, NodeSpecs};
use crate::observability::{RebalancerMetrics, StructuredLogger};
use crate::policy::{RandomTargetSelector, TargetSelector, Thresholds};
use crate::source::SampleSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Engine settings, validated before any loop starts
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub thresholds: Thresholds,
    /// Period of the container inventory refresh (default: 5 seconds)
    pub refresh_interval: Duration,
    /// Longest wait for the next sample before re-checking for shutdown
    pub poll_timeout: Duration,
    /// Upper bound on any single inventory or migration call
    pub provider_timeout: Duration,
    /// Pending migration requests before new ones are dropped
    pub migration_queue_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            refresh_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(1),
            provider_timeout: Duration::from_secs(30),
            migration_queue_size: 64,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("cpu threshold", self.thresholds.cpu_percent),
            ("memory threshold", self.thresholds.memory_percent),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(RebalancerError::InvalidConfig(format!(
                    "{} must be a non-negative percentage, got {}",
                    name, value
                )));
            }
        }

        let durations = [
            ("refresh interval", self.refresh_interval),
            ("poll timeout", self.poll_timeout),
            ("provider timeout", self.provider_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(RebalancerError::InvalidConfig(format!("{} must be positive", name)));
            }
        }

        if self.migration_queue_size == 0 {
            return Err(RebalancerError::InvalidConfig(
                "migration queue size must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read side of the engine shared with the API layer
///
/// Accessors return the most recently known snapshot.
#[derive(Clone)]
pub struct EngineHandle {
    provider: Arc<dyn InventoryProvider>,
    node_specs: Arc<NodeSpecs>,
    inventory: ContainerInventory,
    provider_timeout: Duration,
    health: HealthRegistry,
    metrics: RebalancerMetrics,
    logger: StructuredLogger,
}

impl EngineHandle {
    pub fn node_specs(&self) -> Arc<NodeSpecs> {
        self.node_specs.clone()
    }

    pub fn containers(&self) -> Arc<Vec<ContainerRef>> {
        self.inventory.snapshot()
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Fetch the container set now and swap it in
    ///
    /// On failure the previous set stays in place.
    pub async fn refresh_now(&self) -> Result<usize> {
        let fetched = tokio::time::timeout(self.provider_timeout, self.provider.containers())
            .await
            .unwrap_or_else(|_| {
                Err(anyhow::anyhow!(
                    "timed out after {}s",
                    self.provider_timeout.as_secs_f64()
                ))
            });

        match fetched {
            Ok(containers) => {
                let previous = self.inventory.snapshot();
                let count = self.inventory.replace(containers);
                self.forget_departed(&previous);
                self.metrics.set_containers_monitored(count);
                self.health.set_healthy(components::INVENTORY).await;
                self.logger.log_inventory_refresh(count);
                Ok(count)
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Inventory refresh failed, keeping previous container set");
                self.metrics.inc_inventory_refresh_failures();
                self.health
                    .set_degraded(components::INVENTORY, format!("refresh failed: {:#}", e))
                    .await;
                Err(RebalancerError::TransientFetch(e))
            }
        }
    }

    /// Drop load metrics of containers no longer placed where they were
    fn forget_departed(&self, previous: &[ContainerRef]) {
        let current = self.inventory.snapshot();
        for old in previous {
            let still_there = current
                .iter()
                .any(|c| c.id == old.id && c.node_id == old.node_id);
            if !still_there {
                self.metrics.remove_container_load(&old.id, &old.node_id);
            }
        }
    }
}

/// Constructed engine, ready to be started
pub struct Engine {
    config: EngineConfig,
    handle: EngineHandle,
    selector: Arc<dyn TargetSelector>,
}

impl Engine {
    /// Build an engine with the random target selector and fresh observability handles
    pub async fn new(provider: Arc<dyn InventoryProvider>, config: EngineConfig) -> Result<Self> {
        EngineBuilder::new().provider(provider).config(config).build().await
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn the ingestion, refresh and dispatch tasks
    pub fn start(
        self,
        source: Box<dyn SampleSource>,
        shutdown: &broadcast::Sender<()>,
    ) -> RunningEngine {
        let (migration_tx, migration_rx) = mpsc::channel(self.config.migration_queue_size);

        let dispatcher = MigrationDispatcher::new(
            self.handle.provider.clone(),
            migration_rx,
            self.config.provider_timeout,
            self.handle.health.clone(),
            self.handle.metrics.clone(),
            self.handle.logger.clone(),
        );
        let ingestion = IngestionLoop::new(
            source,
            &self.handle,
            &self.config,
            self.selector.clone(),
            migration_tx,
        );
        let refresh = RefreshLoop::new(self.handle.clone(), self.config.refresh_interval);

        info!(
            cpu_threshold = self.config.thresholds.cpu_percent,
            memory_threshold = self.config.thresholds.memory_percent,
            refresh_interval_secs = self.config.refresh_interval.as_secs_f64(),
            "Starting rebalancer engine"
        );

        RunningEngine {
            shutdown: shutdown.clone(),
            ingestion: Some(tokio::spawn(ingestion.run(shutdown.subscribe()))),
            refresh: tokio::spawn(refresh.run(shutdown.subscribe())),
            dispatcher: tokio::spawn(dispatcher.run(shutdown.subscribe())),
        }
    }
}

/// Builder for the engine
pub struct EngineBuilder {
    provider: Option<Arc<dyn InventoryProvider>>,
    config: EngineConfig,
    selector: Option<Arc<dyn TargetSelector>>,
    health: Option<HealthRegistry>,
    metrics: Option<RebalancerMetrics>,
    logger: Option<StructuredLogger>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            config: EngineConfig::default(),
            selector: None,
            health: None,
            metrics: None,
            logger: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn InventoryProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the random target selection
    pub fn selector(mut self, selector: Arc<dyn TargetSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metrics(mut self, metrics: RebalancerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Validate the configuration and load the initial inventory
    pub async fn build(self) -> Result<Engine> {
        let provider = self
            .provider
            .ok_or_else(|| RebalancerError::InvalidConfig("inventory provider is required".into()))?;
        self.config.validate()?;

        let timeout = self.config.provider_timeout;

        let all_specs = tokio::time::timeout(timeout, provider.node_specs())
            .await
            .map_err(|_| RebalancerError::startup("timed out fetching node specs"))?
            .map_err(|e| RebalancerError::Startup(e.context("could not fetch node specs")))?;

        let mut node_specs = NodeSpecs::new();
        for (node_id, spec) in all_specs {
            if spec.is_valid() {
                node_specs.insert(node_id, spec);
            } else {
                warn!(
                    node = %node_id,
                    cores = spec.num_cpu_cores,
                    memory_bytes = spec.memory_capacity_bytes,
                    "Ignoring node with invalid capacity"
                );
            }
        }
        if node_specs.is_empty() {
            return Err(RebalancerError::startup("no node with a usable capacity spec"));
        }

        let containers = tokio::time::timeout(timeout, provider.containers())
            .await
            .map_err(|_| RebalancerError::startup("timed out fetching containers"))?
            .map_err(|e| RebalancerError::Startup(e.context("could not fetch containers")))?;
        if containers.is_empty() {
            warn!("No containers to monitor yet");
        }

        let metrics = self.metrics.unwrap_or_default();
        let inventory = ContainerInventory::new(containers);
        metrics.set_nodes_known(node_specs.len());
        metrics.set_containers_monitored(inventory.len());
        debug!(nodes = ?node_specs.keys().collect::<Vec<&NodeId>>(), "Loaded node specs");

        let health = match self.health {
            Some(health) => health,
            None => HealthRegistry::with_default_components().await,
        };

        Ok(Engine {
            config: self.config,
            handle: EngineHandle {
                provider,
                node_specs: Arc::new(node_specs),
                inventory,
                provider_timeout: timeout,
                health,
                metrics,
                logger: self.logger.unwrap_or_else(|| StructuredLogger::new("edge-rebalancer")),
            },
            selector: self
                .selector
                .unwrap_or_else(|| Arc::new(RandomTargetSelector::new())),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tasks of a started engine
pub struct RunningEngine {
    shutdown: broadcast::Sender<()>,
    ingestion: Option<JoinHandle<Result<()>>>,
    refresh: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl RunningEngine {
    /// Resolves when ingestion ends by itself, i.e. the sample transport failed
    ///
    /// Pending forever once the ingestion result has been taken.
    pub async fn ingestion_stopped(&mut self) -> Result<()> {
        match self.ingestion.as_mut() {
            Some(handle) => {
                let result = flatten(handle.await);
                self.ingestion = None;
                result
            }
            None => std::future::pending().await,
        }
    }

    /// Signal every task to stop and wait for them
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.shutdown.send(());

        let result = match self.ingestion.take() {
            Some(handle) => flatten(handle.await),
            None => Ok(()),
        };
        if let Err(e) = self.refresh.await {
            warn!(error = %e, "Refresh task ended abnormally");
        }
        if let Err(e) = self.dispatcher.await {
            warn!(error = %e, "Migration dispatcher ended abnormally");
        }
        result
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.unwrap_or_else(|e| Err(RebalancerError::transport(format!("ingestion task failed: {}", e))))
}
