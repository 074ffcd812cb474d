use crate::error::{RebalancerError, Result};
use crate::health::{components, HealthRegistry};
use crate::inventory::InventoryProvider;
use crate::models::{ContainerRef, NodeId};
use crate::observability::{RebalancerMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// A container to move, as decided by the ingestion loop
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    pub container: ContainerRef,
    pub target: NodeId,
    pub cpu_load_percent: f64,
    pub memory_load_percent: f64,
}

/// Forwards queued migration requests to the orchestrator one at a time
///
/// Failures are logged and counted; nothing is retried.
pub struct MigrationDispatcher {
    provider: Arc<dyn InventoryProvider>,
    requests: mpsc::Receiver<MigrationRequest>,
    timeout: Duration,
    health: HealthRegistry,
    metrics: RebalancerMetrics,
    logger: StructuredLogger,
}

impl MigrationDispatcher {
    pub fn new(
        provider: Arc<dyn InventoryProvider>,
        requests: mpsc::Receiver<MigrationRequest>,
        timeout: Duration,
        health: HealthRegistry,
        metrics: RebalancerMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            provider,
            requests,
            timeout,
            health,
            metrics,
            logger,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting migration dispatcher");

        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            // Outcome is already logged and counted
            let _ = self.dispatch(request).await;
        }

        info!("Migration dispatcher stopped");
    }

    /// Issue one migration request
    pub async fn dispatch(&self, request: MigrationRequest) -> Result<()> {
        let container = &request.container;
        let outcome = tokio::time::timeout(self.timeout, self.provider.migrate(container, &request.target))
            .await
            .unwrap_or_else(|_| {
                Err(anyhow::anyhow!(
                    "no answer after {}s",
                    self.timeout.as_secs_f64()
                ))
            });

        match outcome {
            Ok(()) => {
                debug!(
                    container_id = %container.id,
                    target_node = %request.target,
                    "Migration request accepted"
                );
                self.health.set_healthy(components::MIGRATION).await;
                Ok(())
            }
            Err(reason) => {
                let error = RebalancerError::MigrationDispatch {
                    container_id: container.id.clone(),
                    target: request.target.clone(),
                    reason,
                };
                self.metrics.inc_migrations_failed();
                self.logger
                    .log_migration_failed(&container.id, &request.target, &error.to_string());
                self.health
                    .set_degraded(components::MIGRATION, error.to_string())
                    .await;
                Err(error)
            }
        }
    }
}
