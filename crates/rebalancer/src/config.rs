//! Rebalancer configuration
//!
//! Read from an optional file (`REBALANCER_CONFIG`, default `rebalancer.toml`)
//! overridden by `REBALANCER_*` environment variables, with `__` separating
//! nested keys, e.g. `REBALANCER_THRESHOLDS__CPU_PERCENT=90`.

use anyhow::{Context, Result};
use rebalancer_lib::engine::EngineConfig;
use rebalancer_lib::inventory::{Kubectl, OsmConfig};
use rebalancer_lib::policy::Thresholds;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "rebalancer.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct RebalancerConfig {
    /// API server port for health/metrics/inventory
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub thresholds: ThresholdSettings,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub source: SourceSettings,

    #[serde(default)]
    pub osm: OsmSettings,

    #[serde(default)]
    pub kubectl: KubectlSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            cpu_percent: thresholds.cpu_percent,
            memory_percent: thresholds.memory_percent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub refresh_interval_secs: u64,
    pub poll_timeout_ms: u64,
    pub provider_timeout_secs: u64,
    pub migration_queue_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 5,
            poll_timeout_ms: 1000,
            provider_timeout_secs: 30,
            migration_queue_size: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Kafka,
    File,
    Stdin,
}

impl Default for SourceKind {
    /// Kafka when the binary is built with it, stdin otherwise
    fn default() -> Self {
        if cfg!(feature = "kafka") {
            Self::Kafka
        } else {
            Self::Stdin
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub auto_offset_reset: String,
    /// Newline-delimited samples for `kind = "file"`
    pub path: Option<PathBuf>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            brokers: "localhost:9092".to_string(),
            topic: "k8s-cluster".to_string(),
            group_id: "monitoring".to_string(),
            auto_offset_reset: "latest".to_string(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OsmSettings {
    pub nbi_url: String,
    pub username: String,
    pub password: String,
    pub project: String,
    pub insecure_tls: bool,
    pub request_timeout_secs: u64,
}

impl Default for OsmSettings {
    fn default() -> Self {
        let osm = OsmConfig::default();
        Self {
            nbi_url: osm.nbi_url,
            username: osm.username,
            password: osm.password,
            project: osm.project,
            insecure_tls: osm.insecure_tls,
            request_timeout_secs: osm.request_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KubectlSettings {
    pub command: PathBuf,
    pub kubeconfig_path: PathBuf,
}

impl Default for KubectlSettings {
    fn default() -> Self {
        Self {
            command: PathBuf::from("/usr/local/bin/kubectl"),
            kubeconfig_path: PathBuf::from("kube_config"),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

impl RebalancerConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("REBALANCER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("REBALANCER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        config
            .try_deserialize()
            .context("Invalid rebalancer configuration")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            thresholds: Thresholds {
                cpu_percent: self.thresholds.cpu_percent,
                memory_percent: self.thresholds.memory_percent,
            },
            refresh_interval: Duration::from_secs(self.engine.refresh_interval_secs),
            poll_timeout: Duration::from_millis(self.engine.poll_timeout_ms),
            provider_timeout: Duration::from_secs(self.engine.provider_timeout_secs),
            migration_queue_size: self.engine.migration_queue_size,
        }
    }

    pub fn osm_config(&self) -> OsmConfig {
        OsmConfig {
            nbi_url: self.osm.nbi_url.clone(),
            username: self.osm.username.clone(),
            password: self.osm.password.clone(),
            project: self.osm.project.clone(),
            insecure_tls: self.osm.insecure_tls,
            request_timeout: Duration::from_secs(self.osm.request_timeout_secs),
        }
    }

    pub fn kubectl(&self) -> Kubectl {
        Kubectl::new(
            self.kubectl.command.clone(),
            self.kubectl.kubeconfig_path.clone(),
        )
    }
}
