//! Observability infrastructure for the rebalancer
//!
//! Provides:
//! - Prometheus metrics (sample throughput, per-container load, migrations, inventory)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_gauge, GaugeVec,
    Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for per-sample processing time (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MetricsInner> = OnceLock::new();

struct MetricsInner {
    sample_processing_seconds: Histogram,
    samples_received: IntCounter,
    samples_unmatched: IntCounter,
    samples_malformed: IntCounter,
    samples_skipped: IntCounter,
    cpu_load_percent: GaugeVec,
    memory_load_percent: GaugeVec,
    migrations_triggered: IntCounter,
    migrations_dropped: IntCounter,
    migrations_failed: IntCounter,
    inventory_refresh_failures: IntCounter,
    containers_monitored: IntGauge,
    nodes_known: IntGauge,
}

impl MetricsInner {
    fn new() -> Self {
        Self {
            sample_processing_seconds: register_histogram!(
                "rebalancer_sample_processing_seconds",
                "Time spent computing load and deciding on one sample",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sample_processing_seconds"),

            samples_received: register_int_counter!(
                "rebalancer_samples_received_total",
                "Usage samples received from the sample source"
            )
            .expect("Failed to register samples_received"),

            samples_unmatched: register_int_counter!(
                "rebalancer_samples_unmatched_total",
                "Samples dropped because no monitored container matched"
            )
            .expect("Failed to register samples_unmatched"),

            samples_malformed: register_int_counter!(
                "rebalancer_samples_malformed_total",
                "Samples that could not be decoded"
            )
            .expect("Failed to register samples_malformed"),

            samples_skipped: register_int_counter!(
                "rebalancer_samples_skipped_total",
                "Matched samples skipped for unknown or invalid node capacity"
            )
            .expect("Failed to register samples_skipped"),

            cpu_load_percent: register_gauge_vec!(
                "rebalancer_container_cpu_load_percent",
                "Latest CPU load of a container relative to its node",
                &["container_id", "node"]
            )
            .expect("Failed to register cpu_load_percent"),

            memory_load_percent: register_gauge_vec!(
                "rebalancer_container_memory_load_percent",
                "Latest memory load of a container relative to its node",
                &["container_id", "node"]
            )
            .expect("Failed to register memory_load_percent"),

            migrations_triggered: register_int_counter!(
                "rebalancer_migrations_triggered_total",
                "Migration requests issued after a threshold was crossed"
            )
            .expect("Failed to register migrations_triggered"),

            migrations_dropped: register_int_counter!(
                "rebalancer_migrations_dropped_total",
                "Migration requests dropped because the dispatch queue was full"
            )
            .expect("Failed to register migrations_dropped"),

            migrations_failed: register_int_counter!(
                "rebalancer_migrations_failed_total",
                "Migration requests rejected by the orchestrator"
            )
            .expect("Failed to register migrations_failed"),

            inventory_refresh_failures: register_int_counter!(
                "rebalancer_inventory_refresh_failures_total",
                "Container inventory refreshes that failed"
            )
            .expect("Failed to register inventory_refresh_failures"),

            containers_monitored: register_int_gauge!(
                "rebalancer_containers_monitored",
                "Containers in the current inventory"
            )
            .expect("Failed to register containers_monitored"),

            nodes_known: register_int_gauge!(
                "rebalancer_nodes_known",
                "Nodes with a valid capacity spec"
            )
            .expect("Failed to register nodes_known"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct RebalancerMetrics {
    _private: (),
}

impl Default for RebalancerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RebalancerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MetricsInner {
        GLOBAL_METRICS.get_or_init(MetricsInner::new)
    }

    pub fn observe_sample_processing(&self, duration_secs: f64) {
        self.inner().sample_processing_seconds.observe(duration_secs);
    }

    pub fn inc_samples_received(&self) {
        self.inner().samples_received.inc();
    }

    pub fn inc_samples_unmatched(&self) {
        self.inner().samples_unmatched.inc();
    }

    pub fn inc_samples_malformed(&self) {
        self.inner().samples_malformed.inc();
    }

    pub fn inc_samples_skipped(&self) {
        self.inner().samples_skipped.inc();
    }

    pub fn set_container_load(&self, container_id: &str, node: &str, cpu: f64, memory: f64) {
        let inner = self.inner();
        inner
            .cpu_load_percent
            .with_label_values(&[container_id, node])
            .set(cpu);
        inner
            .memory_load_percent
            .with_label_values(&[container_id, node])
            .set(memory);
    }

    /// Drop the load series of a container that left the inventory or moved node
    pub fn remove_container_load(&self, container_id: &str, node: &str) {
        let inner = self.inner();
        // Absent series are fine: the container may never have reported
        let _ = inner
            .cpu_load_percent
            .remove_label_values(&[container_id, node]);
        let _ = inner
            .memory_load_percent
            .remove_label_values(&[container_id, node]);
    }

    /// Whether a load series exists for the container on `node`
    pub fn has_container_load(&self, container_id: &str, node: &str) -> bool {
        let inner = self.inner();
        prometheus::core::Collector::collect(&inner.cpu_load_percent)
            .iter()
            .flat_map(|family| family.get_metric())
            .any(|metric| {
                let labels = metric.get_label();
                labels
                    .iter()
                    .any(|l| l.get_name() == "container_id" && l.get_value() == container_id)
                    && labels
                        .iter()
                        .any(|l| l.get_name() == "node" && l.get_value() == node)
            })
    }

    pub fn inc_migrations_triggered(&self) {
        self.inner().migrations_triggered.inc();
    }

    pub fn inc_migrations_dropped(&self) {
        self.inner().migrations_dropped.inc();
    }

    pub fn inc_migrations_failed(&self) {
        self.inner().migrations_failed.inc();
    }

    pub fn inc_inventory_refresh_failures(&self) {
        self.inner().inventory_refresh_failures.inc();
    }

    pub fn set_containers_monitored(&self, count: usize) {
        self.inner().containers_monitored.set(count as i64);
    }

    pub fn set_nodes_known(&self, count: usize) {
        self.inner().nodes_known.set(count as i64);
    }
}

/// Structured logger for rebalancer events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, nodes: usize, containers: usize) {
        info!(
            event = "rebalancer_started",
            instance = %self.instance,
            version = %version,
            nodes = nodes,
            containers = containers,
            "Rebalancer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "rebalancer_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Rebalancer shutting down"
        );
    }

    pub fn log_load(&self, container_id: &str, node: &str, cpu_load: f64, memory_load: f64) {
        debug!(
            event = "load_computed",
            instance = %self.instance,
            container_id = %container_id,
            node = %node,
            cpu_load_percent = cpu_load,
            memory_load_percent = memory_load,
            "Computed container load"
        );
    }

    pub fn log_migration_triggered(
        &self,
        container_id: &str,
        source: &str,
        target: &str,
        cpu_load: f64,
        memory_load: f64,
    ) {
        info!(
            event = "migration_triggered",
            instance = %self.instance,
            container_id = %container_id,
            source_node = %source,
            target_node = %target,
            cpu_load_percent = cpu_load,
            memory_load_percent = memory_load,
            "Load threshold exceeded, requesting migration"
        );
    }

    pub fn log_migration_failed(&self, container_id: &str, target: &str, error: &str) {
        warn!(
            event = "migration_failed",
            instance = %self.instance,
            container_id = %container_id,
            target_node = %target,
            error = %error,
            "Migration request failed"
        );
    }

    pub fn log_inventory_refresh(&self, containers: usize) {
        debug!(
            event = "inventory_refreshed",
            instance = %self.instance,
            containers = containers,
            "Container inventory refreshed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let a = RebalancerMetrics::new();
        let b = a.clone();

        a.inc_samples_received();
        b.inc_samples_received();
        a.set_container_load("c1", "n1", 25.0, 50.0);
        b.set_containers_monitored(3);
        b.set_nodes_known(2);
        a.observe_sample_processing(0.0001);

        let families = prometheus::gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"rebalancer_samples_received_total"));
        assert!(names.contains(&"rebalancer_container_cpu_load_percent"));
    }

    #[test]
    fn test_remove_container_load() {
        let metrics = RebalancerMetrics::new();
        metrics.set_container_load("gone-1", "n1", 10.0, 20.0);
        assert!(metrics.has_container_load("gone-1", "n1"));

        metrics.remove_container_load("gone-1", "n1");
        assert!(!metrics.has_container_load("gone-1", "n1"));

        // Removing a series that never existed is a no-op
        metrics.remove_container_load("never-seen", "n1");
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("edge-rebalancer-0");
        assert_eq!(logger.instance, "edge-rebalancer-0");
    }
}
