//! Kubernetes API backed cluster source
//!
//! Pods come from the core API; usage comes from the `metrics.k8s.io`
//! aggregated API, read as a dynamic object since PodMetrics has no typed
//! binding in k8s-openapi.

use super::{async_trait, ClusterSource};
use crate::error::SourceError;
use crate::models::{ContainerStatusSnapshot, ContainerUsage, PodSnapshot};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use tracing::{debug, info};

const METRICS_GROUP: &str = "metrics.k8s.io";
const METRICS_VERSION: &str = "v1beta1";
const METRICS_KIND: &str = "PodMetrics";
const METRICS_PLURAL: &str = "pods";

/// Cluster source talking to a live API server
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
    pod_metrics: ApiResource,
}

impl KubeSource {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(METRICS_GROUP, METRICS_VERSION, METRICS_KIND);
        Self {
            client,
            pod_metrics: ApiResource::from_gvk_with_plural(&gvk, METRICS_PLURAL),
        }
    }

    /// Resolve credentials: in-cluster service account first, then kubeconfig
    pub async fn connect() -> Result<Self, SourceError> {
        let config = match Config::incluster() {
            Ok(config) => {
                info!("Using in-cluster Kubernetes configuration");
                config
            }
            Err(incluster_err) => {
                debug!(
                    error = %incluster_err,
                    "In-cluster configuration unavailable, trying kubeconfig"
                );
                let config = Config::from_kubeconfig(&KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        SourceError::Credentials(format!(
                            "in-cluster: {}; kubeconfig: {}",
                            incluster_err, e
                        ))
                    })?;
                info!("Using local kubeconfig");
                config
            }
        };

        let client =
            Client::try_from(config).map_err(|e| SourceError::Credentials(e.to_string()))?;
        Ok(Self::new(client))
    }
}

fn api_error(err: kube::Error) -> SourceError {
    SourceError::Api(err.to_string())
}

/// Flatten a typed pod into the fields the sampler uses
pub(crate) fn pod_snapshot(pod: Pod) -> PodSnapshot {
    let status = pod.status.unwrap_or_default();

    PodSnapshot {
        namespace: pod.metadata.namespace.unwrap_or_default(),
        name: pod.metadata.name.unwrap_or_default(),
        labels: pod.metadata.labels.unwrap_or_default(),
        start_time: status.start_time.map(|t| t.0),
        container_statuses: status
            .container_statuses
            .unwrap_or_default()
            .into_iter()
            .map(|cs| ContainerStatusSnapshot {
                running_started_at: cs
                    .state
                    .and_then(|s| s.running)
                    .and_then(|r| r.started_at)
                    .map(|t| t.0),
                name: cs.name,
            })
            .collect(),
    }
}

/// Extract `containers[]` from a PodMetrics object
pub(crate) fn container_usage(obj: &DynamicObject) -> Result<Vec<ContainerUsage>, SourceError> {
    let containers = obj
        .data
        .get("containers")
        .cloned()
        .ok_or_else(|| SourceError::Decode("PodMetrics without containers".to_string()))?;

    serde_json::from_value(containers).map_err(|e| SourceError::Decode(e.to_string()))
}

#[async_trait]
impl ClusterSource for KubeSource {
    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, SourceError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&ListParams::default()).await.map_err(api_error)?;

        Ok(list.items.into_iter().map(pod_snapshot).collect())
    }

    async fn pod_usage(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Vec<ContainerUsage>, SourceError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.pod_metrics);

        match api.get(pod).await {
            Ok(obj) => container_usage(&obj),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Err(SourceError::NotFound {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            }),
            Err(e) => Err(api_error(e)),
        }
    }
}
