use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    alert::UnifiedAlert,
    store::{NodeMeta, PodMeta, Store, WorkloadMeta},
    Result,
};

/// Lookup of cluster entities referenced by alerts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn workload(&self, workload_id: &str) -> Result<Option<WorkloadMeta>>;
    async fn pod(&self, pod_id: &str) -> Result<Option<PodMeta>>;
    async fn node(&self, node_name: &str) -> Result<Option<NodeMeta>>;
}

/// Metadata backed by the entity tables of the alert store.
pub struct StoreMetadata {
    store: Arc<dyn Store>,
}

impl StoreMetadata {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetadataSource for StoreMetadata {
    async fn workload(&self, workload_id: &str) -> Result<Option<WorkloadMeta>> {
        self.store.get_workload(workload_id).await
    }

    async fn pod(&self, pod_id: &str) -> Result<Option<PodMeta>> {
        self.store.get_pod(pod_id).await
    }

    async fn node(&self, node_name: &str) -> Result<Option<NodeMeta>> {
        self.store.get_node(node_name).await
    }
}

pub struct Enricher {
    source: Arc<dyn MetadataSource>,
    default_cluster: String,
}

impl Enricher {
    pub fn new(source: Arc<dyn MetadataSource>, default_cluster: impl Into<String>) -> Self {
        Self {
            source,
            default_cluster: default_cluster.into(),
        }
    }

    /// Adds workload, pod and node context to the alert. Lookup failures are
    /// logged and skipped.
    pub async fn enrich(&self, alert: &mut UnifiedAlert) {
        if !alert.workload_id.is_empty() {
            match self.source.workload(&alert.workload_id).await {
                Ok(Some(workload)) => {
                    alert.enriched_data.insert("workload_name".into(), json!(workload.name));
                    alert.enriched_data.insert("workload_namespace".into(), json!(workload.namespace));
                    alert.enriched_data.insert("workload_kind".into(), json!(workload.kind));
                    alert.enriched_data.insert("workload_status".into(), json!(workload.status));
                    if alert.cluster_name.is_empty() {
                        alert.cluster_name = if workload.cluster_name.is_empty() {
                            self.default_cluster.clone()
                        } else {
                            workload.cluster_name
                        };
                    }
                }
                Ok(None) => debug!("No workload metadata for {}", alert.workload_id),
                Err(e) => warn!("Workload lookup failed for alert {}: {}", alert.id, e),
            }
        }

        if !alert.pod_id.is_empty() {
            match self.source.pod(&alert.pod_id).await {
                Ok(Some(pod)) => {
                    alert.enriched_data.insert("pod_namespace".into(), json!(pod.namespace));
                    alert.enriched_data.insert("pod_phase".into(), json!(pod.phase));
                    alert.enriched_data.insert("pod_name".into(), json!(pod.name));
                    alert.enriched_data.insert("pod_gpu_allocated".into(), json!(pod.gpu_allocated));
                    if alert.node_name.is_empty() {
                        alert.node_name = pod.node_name;
                    }
                }
                Ok(None) => debug!("No pod metadata for {}", alert.pod_id),
                Err(e) => warn!("Pod lookup failed for alert {}: {}", alert.id, e),
            }
        }

        if !alert.node_name.is_empty() {
            match self.source.node(&alert.node_name).await {
                Ok(Some(node)) => {
                    alert.enriched_data.insert("node_address".into(), json!(node.address));
                    alert.enriched_data.insert("node_status".into(), json!(node.status));
                }
                Ok(None) => debug!("No node metadata for {}", alert.node_name),
                Err(e) => warn!("Node lookup failed for alert {}: {}", alert.id, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSource;
    use crate::Error;

    fn alert() -> UnifiedAlert {
        let mut alert = UnifiedAlert::new("a1", AlertSource::Log, "OOMError");
        alert.workload_id = "wl-1".to_string();
        alert.pod_id = "pod-uid-1".to_string();
        alert
    }

    #[tokio::test]
    async fn test_enrich_fills_context_and_node_from_pod() {
        let mut source = MockMetadataSource::new();
        source.expect_workload().returning(|_| {
            Ok(Some(WorkloadMeta {
                workload_id: "wl-1".to_string(),
                name: "llama-train".to_string(),
                namespace: "ml".to_string(),
                kind: "PyTorchJob".to_string(),
                status: "Running".to_string(),
                cluster_name: String::new(),
            }))
        });
        source.expect_pod().returning(|_| {
            Ok(Some(PodMeta {
                pod_id: "pod-uid-1".to_string(),
                name: "llama-train-worker-0".to_string(),
                namespace: "ml".to_string(),
                phase: "Running".to_string(),
                node_name: "gpu-node-7".to_string(),
                gpu_allocated: 8,
            }))
        });
        source
            .expect_node()
            .withf(|name| name == "gpu-node-7")
            .returning(|_| {
                Ok(Some(NodeMeta {
                    name: "gpu-node-7".to_string(),
                    address: "10.0.0.7".to_string(),
                    status: "Ready".to_string(),
                }))
            });

        let enricher = Enricher::new(Arc::new(source), "default");
        let mut alert = alert();
        enricher.enrich(&mut alert).await;

        assert_eq!(alert.cluster_name, "default");
        assert_eq!(alert.node_name, "gpu-node-7");
        assert_eq!(alert.enriched_data["workload_name"], "llama-train");
        assert_eq!(alert.enriched_data["pod_gpu_allocated"], 8);
        assert_eq!(alert.enriched_data["node_address"], "10.0.0.7");
    }

    #[tokio::test]
    async fn test_enrich_survives_lookup_failures() {
        let mut source = MockMetadataSource::new();
        source
            .expect_workload()
            .returning(|_| Err(Error::Internal("db down".to_string())));
        source.expect_pod().returning(|_| Ok(None));
        source.expect_node().never();

        let enricher = Enricher::new(Arc::new(source), "default");
        let mut alert = alert();
        enricher.enrich(&mut alert).await;

        assert!(alert.enriched_data.is_empty());
        assert_eq!(alert.cluster_name, "");
    }
}
