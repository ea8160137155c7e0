//! Kubernetes cluster API binding
//!
//! Lists nodes, pods and `metrics.k8s.io` pod metrics and converts them into
//! the library's typed records.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use nodecost_lib::collaborators::ClusterApi;
use nodecost_lib::{
    AddressType, ClusterNode, ContainerResources, ContainerUsage, NodeAddress, NodeIdentity,
    PodResources, PodUsage, RawResources,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Cluster API backed by a kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using a kubeconfig file and context, or the inferred environment
    pub async fn connect(kubeconfig: Option<&Path>, context: Option<&str>) -> Result<Self> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };

        let config = match (kubeconfig, context) {
            (Some(path), _) => {
                let raw = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                kube::Config::from_custom_kubeconfig(raw, &options)
                    .await
                    .context("Invalid kubeconfig")?
            }
            (None, Some(_)) => kube::Config::from_kubeconfig(&options)
                .await
                .context("Invalid kubeconfig context")?,
            (None, None) => kube::Config::infer()
                .await
                .context("Failed to infer cluster configuration")?,
        };

        debug!(cluster_url = %config.cluster_url, "Connecting to cluster");
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self { client })
    }
}

/// `metrics.k8s.io/v1beta1` PodMetrics
fn pod_metrics_api_resource() -> ApiResource {
    ApiResource {
        group: "metrics.k8s.io".to_string(),
        version: "v1beta1".to_string(),
        api_version: "metrics.k8s.io/v1beta1".to_string(),
        kind: "PodMetrics".to_string(),
        plural: "pods".to_string(),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("Failed to list nodes")?;

        debug!("Found {} nodes", list.items.len());
        Ok(list.items.into_iter().map(node_from_api).collect())
    }

    async fn list_pods(&self, node_name: Option<&str>) -> Result<Vec<PodResources>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let params = match node_name {
            Some(node) => ListParams::default().fields(&format!("spec.nodeName={node}")),
            None => ListParams::default(),
        };
        let list = api.list(&params).await.context("Failed to list pods")?;

        debug!("Found {} pods", list.items.len());
        Ok(list.items.into_iter().map(pod_from_api).collect())
    }

    async fn list_live_usage(&self) -> Result<Vec<PodUsage>> {
        let ar = pod_metrics_api_resource();
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let list = api
            .list(&ListParams::default())
            .await
            .context("Failed to list pod metrics (is metrics-server installed?)")?;

        Ok(list.items.into_iter().filter_map(usage_from_metrics).collect())
    }
}

fn raw_resources(map: Option<&BTreeMap<String, Quantity>>) -> RawResources {
    let get = |key: &str| map.and_then(|m| m.get(key)).map(|q| q.0.clone());
    RawResources {
        cpu: get("cpu"),
        memory: get("memory"),
    }
}

pub(crate) fn node_from_api(node: Node) -> ClusterNode {
    let status = node.status.unwrap_or_default();

    let addresses = status
        .addresses
        .unwrap_or_default()
        .into_iter()
        .map(|a| NodeAddress {
            kind: AddressType::from_api(&a.type_),
            address: a.address,
        })
        .collect();

    ClusterNode {
        identity: NodeIdentity {
            name: node.metadata.name.unwrap_or_default(),
            addresses,
            annotations: node.metadata.annotations.unwrap_or_default(),
        },
        capacity: raw_resources(status.capacity.as_ref()),
        allocatable: raw_resources(status.allocatable.as_ref()),
    }
}

pub(crate) fn pod_from_api(pod: Pod) -> PodResources {
    let spec = pod.spec.unwrap_or_default();

    let containers = spec
        .containers
        .into_iter()
        .map(|c| {
            let resources = c.resources.unwrap_or_default();
            ContainerResources {
                name: c.name,
                requests: raw_resources(resources.requests.as_ref()),
                limits: raw_resources(resources.limits.as_ref()),
            }
        })
        .collect();

    PodResources {
        namespace: pod.metadata.namespace.unwrap_or_default(),
        name: pod.metadata.name.unwrap_or_default(),
        node_name: spec.node_name,
        phase: pod.status.and_then(|s| s.phase),
        containers,
    }
}

#[derive(Debug, Deserialize)]
struct MetricsContainer {
    name: String,
    #[serde(default)]
    usage: BTreeMap<String, String>,
}

/// Typed pod usage; malformed metrics objects are dropped with a warning
pub(crate) fn usage_from_metrics(obj: DynamicObject) -> Option<PodUsage> {
    let namespace = obj.metadata.namespace.unwrap_or_default();
    let name = obj.metadata.name.unwrap_or_default();

    let raw = obj.data.get("containers").cloned().unwrap_or_default();
    let containers: Vec<MetricsContainer> = match serde_json::from_value(raw) {
        Ok(containers) => containers,
        Err(e) => {
            warn!(pod = %format!("{namespace}/{name}"), error = %e, "Malformed pod metrics, skipping");
            return None;
        }
    };

    Some(PodUsage {
        namespace,
        name,
        containers: containers
            .into_iter()
            .map(|c| ContainerUsage {
                name: c.name,
                usage: RawResources {
                    cpu: c.usage.get("cpu").cloned(),
                    memory: c.usage.get("memory").cloned(),
                },
            })
            .collect(),
    })
}
