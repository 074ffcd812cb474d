//! OSM NBI inventory provider
//!
//! Network-service instances, their VNF records and deployed KDUs come from
//! the OSM northbound interface; pods and nodes of the K8s cluster registered
//! in OSM are read with kubectl, using the credentials OSM holds for it.

use super::kubectl::Kubectl;
use super::InventoryProvider;
use crate::models::{ContainerRef, NodeId, NodeSpecs};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Connection settings for the OSM NBI
#[derive(Debug, Clone)]
pub struct OsmConfig {
    /// Base URL, e.g. "https://osm.example:9999/osm"
    pub nbi_url: String,
    pub username: String,
    pub password: String,
    pub project: String,
    /// Accept self-signed NBI certificates
    pub insecure_tls: bool,
    pub request_timeout: Duration,
}

impl Default for OsmConfig {
    fn default() -> Self {
        Self {
            nbi_url: "https://localhost:9999/osm".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            project: "admin".to_string(),
            insecure_tls: true,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct K8sCluster {
    #[serde(default)]
    name: Option<String>,
    credentials: Value,
}

#[derive(Debug, Deserialize)]
struct NsInstance {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "constituent-vnfr-ref", default)]
    constituent_vnfr_ref: Vec<String>,
    #[serde(rename = "_admin", default)]
    admin: NsAdmin,
}

#[derive(Debug, Default, Deserialize)]
struct NsAdmin {
    #[serde(default)]
    deployed: Option<NsDeployed>,
}

#[derive(Debug, Default, Deserialize)]
struct NsDeployed {
    #[serde(rename = "K8s", default)]
    k8s: Vec<KduDeployment>,
}

#[derive(Debug, Deserialize)]
struct KduDeployment {
    #[serde(rename = "kdu-instance", default)]
    kdu_instance: Option<String>,
    #[serde(rename = "member-vnf-index")]
    member_vnf_index: String,
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct VnfRecord {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "member-vnf-index-ref")]
    member_vnf_index_ref: String,
}

/// Inventory backed by OSM and kubectl
pub struct OsmInventory {
    http: Client,
    config: OsmConfig,
    kubectl: Kubectl,
    token: Mutex<Option<String>>,
}

impl OsmInventory {
    /// Authenticate against the NBI and fetch the kubeconfig of the first
    /// registered K8s cluster into the kubectl kubeconfig path
    pub async fn connect(config: OsmConfig, kubectl: Kubectl) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .context("Failed to create HTTP client")?;

        let inventory = Self {
            http,
            config,
            kubectl,
            token: Mutex::new(None),
        };

        let clusters: Vec<K8sCluster> = inventory
            .request(Method::GET, "/admin/v1/k8sclusters", None)
            .await
            .context("Could not list K8s clusters registered in OSM")?;
        write_kubeconfig(inventory.kubectl.kubeconfig(), &clusters).await?;

        info!(nbi_url = %inventory.config.nbi_url, "Connected to OSM NBI");
        Ok(inventory)
    }

    async fn authenticate(&self) -> Result<String> {
        let url = format!("{}/admin/v1/tokens", self.config.nbi_url);
        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(&json!({
                "username": self.config.username,
                "password": self.config.password,
                "project_id": self.config.project,
            }))
            .send()
            .await
            .context("Failed to send token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OSM authentication failed ({}): {}", status, body);
        }

        let token: Token = response.json().await.context("Failed to parse token")?;
        debug!("Obtained OSM NBI token");
        Ok(token.id)
    }

    async fn bearer(&self, renew: bool) -> Result<String> {
        let mut token = self.token.lock().await;
        match token.as_ref() {
            Some(existing) if !renew => Ok(existing.clone()),
            _ => {
                let fresh = self.authenticate().await?;
                *token = Some(fresh.clone());
                Ok(fresh)
            }
        }
    }

    /// Issue an NBI request, re-authenticating once if the token expired
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.config.nbi_url, path);
        let mut renew = false;

        loop {
            let token = self.bearer(renew).await?;
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .header("Accept", "application/json");
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .with_context(|| format!("Failed to send {} {}", method, path))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !renew {
                debug!(path = %path, "NBI token rejected, re-authenticating");
                renew = true;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                anyhow::bail!("OSM NBI error on {} {} ({}): {}", method, path, status, text);
            }

            let text = if text.trim().is_empty() { "null" } else { text.as_str() };
            return serde_json::from_str(text)
                .with_context(|| format!("Failed to parse response of {} {}", method, path));
        }
    }

    async fn vnf_index(&self, ns: &NsInstance) -> Result<HashMap<String, String>> {
        let mut by_index = HashMap::new();
        for vnf_id in &ns.constituent_vnfr_ref {
            let vnf: VnfRecord = self
                .request(Method::GET, &format!("/nslcm/v1/vnf_instances/{}", vnf_id), None)
                .await?;
            by_index.insert(vnf.member_vnf_index_ref, vnf.id);
        }
        Ok(by_index)
    }
}

#[async_trait]
impl InventoryProvider for OsmInventory {
    async fn node_specs(&self) -> Result<NodeSpecs> {
        self.kubectl.node_specs().await
    }

    async fn containers(&self) -> Result<Vec<ContainerRef>> {
        let ns_instances: Vec<NsInstance> = self
            .request(Method::GET, "/nslcm/v1/ns_instances", None)
            .await?;

        if ns_instances.is_empty() {
            warn!("No deployed NS instances");
        }

        let mut containers = Vec::new();

        for ns in &ns_instances {
            let Some(deployed) = ns.admin.deployed.as_ref() else {
                debug!(ns_id = %ns.id, "NS instance not deployed yet, skipping");
                continue;
            };

            let vnf_by_index = self.vnf_index(ns).await?;

            for kdu in &deployed.k8s {
                let Some(kdu_id) = kdu.kdu_instance.clone() else {
                    continue;
                };
                let vnf_id = vnf_by_index
                    .get(&kdu.member_vnf_index)
                    .cloned()
                    .unwrap_or_else(|| {
                        warn!(
                            ns_id = %ns.id,
                            member_vnf_index = %kdu.member_vnf_index,
                            "No VNF record for KDU member index"
                        );
                        String::new()
                    });

                for pod_container in self.kubectl.ns_containers(&kdu.namespace, &ns.id).await? {
                    containers.push(ContainerRef {
                        id: pod_container.container_id,
                        node_id: pod_container.node_name,
                        ns_id: ns.id.clone(),
                        vnf_id: vnf_id.clone(),
                        kdu_id: kdu_id.clone(),
                    });
                }
            }
        }

        Ok(containers)
    }

    async fn migrate(&self, container: &ContainerRef, target: &NodeId) -> Result<()> {
        let path = format!("/nslcm/v1/ns_instances/{}/migrate", container.ns_id);
        let body = json!({
            "vnfInstanceId": container.vnf_id,
            "migrateToHost": target,
        });

        let operation: Value = self.request(Method::POST, &path, Some(&body)).await?;
        info!(
            container_id = %container.id,
            ns_id = %container.ns_id,
            target = %target,
            operation = %operation,
            "Migration requested"
        );
        Ok(())
    }
}

/// Write the credentials of the first registered cluster as a kubeconfig
async fn write_kubeconfig(path: &Path, clusters: &[K8sCluster]) -> Result<()> {
    let cluster = clusters
        .first()
        .context("No K8s cluster registered in OSM")?;

    // kubectl accepts JSON kubeconfigs
    let content =
        serde_json::to_vec_pretty(&cluster.credentials).context("Failed to encode kubeconfig")?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write kubeconfig to {}", path.display()))?;

    info!(
        cluster = cluster.name.as_deref().unwrap_or("<unnamed>"),
        path = %path.display(),
        "Wrote cluster kubeconfig"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(url: String) -> OsmConfig {
        OsmConfig {
            nbi_url: url,
            insecure_tls: false,
            request_timeout: Duration::from_secs(5),
            ..OsmConfig::default()
        }
    }

    async fn connected(
        server: &mut mockito::Server,
        dir: &TempDir,
    ) -> (OsmInventory, Vec<mockito::Mock>) {
        let token = server
            .mock("POST", "/admin/v1/tokens")
            .with_status(200)
            .with_body(r#"{"id": "tok-1"}"#)
            .create_async()
            .await;
        let clusters = server
            .mock("GET", "/admin/v1/k8sclusters")
            .match_header("authorization", "Bearer tok-1")
            .with_status(200)
            .with_body(r#"[{"name": "edge", "credentials": {"apiVersion": "v1", "kind": "Config"}}]"#)
            .create_async()
            .await;

        let kubectl = Kubectl::new("kubectl", dir.path().join("kube_config"));
        let inventory = OsmInventory::connect(config(server.url()), kubectl).await.unwrap();
        (inventory, vec![token, clusters])
    }

    #[tokio::test]
    async fn test_connect_writes_kubeconfig() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();

        let (_inventory, _mocks) = connected(&mut server, &dir).await;

        let written = tokio::fs::read_to_string(dir.path().join("kube_config")).await.unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["kind"], "Config");
    }

    #[tokio::test]
    async fn test_connect_fails_without_clusters() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let _token = server
            .mock("POST", "/admin/v1/tokens")
            .with_status(200)
            .with_body(r#"{"id": "tok-1"}"#)
            .create_async()
            .await;
        let _clusters = server
            .mock("GET", "/admin/v1/k8sclusters")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let kubectl = Kubectl::new("kubectl", dir.path().join("kube_config"));
        assert!(OsmInventory::connect(config(server.url()), kubectl).await.is_err());
    }

    #[tokio::test]
    async fn test_migrate_posts_target() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let (inventory, _mocks) = connected(&mut server, &dir).await;

        let migrate = server
            .mock("POST", "/nslcm/v1/ns_instances/ns-1/migrate")
            .match_header("authorization", "Bearer tok-1")
            .match_body(mockito::Matcher::Json(json!({
                "vnfInstanceId": "vnf-1",
                "migrateToHost": "edge-2",
            })))
            .with_status(202)
            .with_body(r#"{"id": "op-1"}"#)
            .create_async()
            .await;

        let container = ContainerRef {
            id: "c1".to_string(),
            node_id: "edge-1".to_string(),
            ns_id: "ns-1".to_string(),
            vnf_id: "vnf-1".to_string(),
            kdu_id: "kdu-1".to_string(),
        };
        inventory.migrate(&container, &"edge-2".to_string()).await.unwrap();
        migrate.assert_async().await;
    }

    #[tokio::test]
    async fn test_migrate_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let (inventory, _mocks) = connected(&mut server, &dir).await;

        let _rejected = server
            .mock("POST", "/nslcm/v1/ns_instances/ns-1/migrate")
            .with_status(422)
            .with_body(r#"{"detail": "KDU migration not supported"}"#)
            .create_async()
            .await;

        let container = ContainerRef {
            id: "c1".to_string(),
            node_id: "edge-1".to_string(),
            ns_id: "ns-1".to_string(),
            vnf_id: "vnf-1".to_string(),
            kdu_id: "kdu-1".to_string(),
        };
        let err = inventory
            .migrate(&container, &"edge-2".to_string())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("422"));
    }

    #[tokio::test]
    async fn test_undeployed_ns_instances_yield_no_containers() {
        let mut server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        let (inventory, _mocks) = connected(&mut server, &dir).await;

        let _ns = server
            .mock("GET", "/nslcm/v1/ns_instances")
            .with_status(200)
            .with_body(r#"[{"_id": "ns-1", "constituent-vnfr-ref": ["vnf-1"], "_admin": {}}]"#)
            .create_async()
            .await;

        let containers = inventory.containers().await.unwrap();
        assert!(containers.is_empty());
    }

    #[test]
    fn test_ns_instance_decoding() {
        let json = r#"{
            "_id": "ns-1",
            "constituent-vnfr-ref": ["vnf-a"],
            "_admin": {"deployed": {"K8s": [
                {"kdu-instance": "kdu-xyz", "member-vnf-index": "1", "namespace": "osm-ns"},
                {"kdu-instance": null, "member-vnf-index": "2", "namespace": "osm-ns"}
            ]}}
        }"#;

        let ns: NsInstance = serde_json::from_str(json).unwrap();
        let deployed = ns.admin.deployed.unwrap();
        assert_eq!(deployed.k8s.len(), 2);
        assert_eq!(deployed.k8s[0].kdu_instance.as_deref(), Some("kdu-xyz"));
        assert!(deployed.k8s[1].kdu_instance.is_none());
    }
}
