//! Edge Rebalancer - load-driven container migration for edge clusters
//!
//! Consumes container usage samples, tracks per-container CPU and memory
//! load against node capacity and asks OSM to migrate containers whose load
//! crosses the configured thresholds.

use anyhow::{bail, Context, Result};
use rebalancer_lib::{
    api,
    engine::Engine,
    health::HealthRegistry,
    inventory::OsmInventory,
    observability::{RebalancerMetrics, StructuredLogger},
    source::{LineSampleSource, SampleSource},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::{RebalancerConfig, SourceKind, SourceSettings};

const REBALANCER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting edge-rebalancer");

    let config = RebalancerConfig::load()?;
    let engine_config = config.engine_config();
    engine_config.validate()?;
    info!(
        nbi_url = %config.osm.nbi_url,
        source = ?config.source.kind,
        "Rebalancer configured"
    );

    let health_registry = HealthRegistry::with_default_components().await;
    let metrics = RebalancerMetrics::new();
    let logger = StructuredLogger::new(instance_name());

    let provider = OsmInventory::connect(config.osm_config(), config.kubectl())
        .await
        .context("Could not connect to OSM")?;

    let engine = Engine::builder()
        .provider(Arc::new(provider))
        .config(engine_config)
        .health(health_registry.clone())
        .metrics(metrics)
        .logger(logger.clone())
        .build()
        .await?;
    let handle = engine.handle();
    logger.log_startup(
        REBALANCER_VERSION,
        handle.node_specs().len(),
        handle.containers().len(),
    );

    let source = open_source(&config.source).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut running = engine.start(source, &shutdown_tx);

    // Start health, metrics and inventory server
    let app_state = Arc::new(api::AppState::new(handle));
    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            Ok(())
        }
        stopped = running.ingestion_stopped() => {
            let reason = match &stopped {
                Ok(()) => "sample ingestion ended".to_string(),
                Err(e) => e.to_string(),
            };
            logger.log_shutdown(&reason);
            stopped.map_err(anyhow::Error::from)
        }
    };

    info!("Shutting down");
    if let Err(e) = running.shutdown().await {
        warn!(error = %e, "Engine stopped with an error");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    outcome
}

fn instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "edge-rebalancer".to_string())
}

async fn open_source(settings: &SourceSettings) -> Result<Box<dyn SampleSource>> {
    match settings.kind {
        SourceKind::Kafka => kafka_source(settings),
        SourceKind::File => {
            let Some(path) = &settings.path else {
                bail!("source.path is required when source.kind is \"file\"");
            };
            Ok(Box::new(LineSampleSource::open(path).await?))
        }
        SourceKind::Stdin => Ok(Box::new(LineSampleSource::stdin())),
    }
}

#[cfg(feature = "kafka")]
fn kafka_source(settings: &SourceSettings) -> Result<Box<dyn SampleSource>> {
    use rebalancer_lib::source::{KafkaConfig, KafkaSampleSource};

    let config = KafkaConfig {
        brokers: settings.brokers.clone(),
        topic: settings.topic.clone(),
        group_id: settings.group_id.clone(),
        auto_offset_reset: settings.auto_offset_reset.clone(),
        ..KafkaConfig::default()
    };
    Ok(Box::new(KafkaSampleSource::subscribe(&config)?))
}

#[cfg(not(feature = "kafka"))]
fn kafka_source(_settings: &SourceSettings) -> Result<Box<dyn SampleSource>> {
    bail!("built without Kafka support; rebuild with --features kafka or set source.kind to \"file\" or \"stdin\"")
}
