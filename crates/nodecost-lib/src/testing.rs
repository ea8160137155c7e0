//! Mock collaborators shared by unit tests

use crate::collaborators::{
    async_trait, ClusterApi, InstanceQuery, InventoryApi, PricedSku, PricingApi, PricingTerm,
};
use crate::models::{
    AddressType, ClusterNode, ContainerResources, ContainerUsage, InstanceFragment, NodeAddress,
    NodeIdentity, PodResources, PodUsage, RawResources,
};
use crate::resolver::INSTANCE_ID_ANNOTATION;
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn raw(cpu: &str, memory: &str) -> RawResources {
    RawResources {
        cpu: Some(cpu.to_string()),
        memory: Some(memory.to_string()),
    }
}

pub(crate) fn node(name: &str, instance_id: Option<&str>, internal_ip: Option<&str>) -> ClusterNode {
    let mut annotations = BTreeMap::new();
    if let Some(id) = instance_id {
        annotations.insert(INSTANCE_ID_ANNOTATION.to_string(), id.to_string());
    }
    let addresses = internal_ip
        .map(|ip| {
            vec![NodeAddress {
                kind: AddressType::InternalIp,
                address: ip.to_string(),
            }]
        })
        .unwrap_or_default();

    ClusterNode {
        identity: NodeIdentity {
            name: name.to_string(),
            addresses,
            annotations,
        },
        capacity: raw("4", "16Gi"),
        allocatable: raw("3920m", "15Gi"),
    }
}

pub(crate) fn pod(name: &str, node_name: &str, cpu: &str, memory: &str) -> PodResources {
    PodResources {
        namespace: "default".to_string(),
        name: name.to_string(),
        node_name: Some(node_name.to_string()),
        phase: Some("Running".to_string()),
        containers: vec![ContainerResources {
            name: "app".to_string(),
            requests: raw(cpu, memory),
            limits: RawResources::default(),
        }],
    }
}

pub(crate) fn usage(name: &str, cpu: &str, memory: &str) -> PodUsage {
    PodUsage {
        namespace: "default".to_string(),
        name: name.to_string(),
        containers: vec![ContainerUsage {
            name: "app".to_string(),
            usage: raw(cpu, memory),
        }],
    }
}

pub(crate) fn fragment(id: &str, machine_type: &str, ip: &str, lifecycle: Option<&str>) -> InstanceFragment {
    InstanceFragment {
        instance_id: id.to_string(),
        machine_type: machine_type.to_string(),
        lifecycle: lifecycle.map(str::to_string),
        private_ip: Some(ip.to_string()),
    }
}

#[derive(Default)]
pub(crate) struct MockCluster {
    pub nodes: Vec<ClusterNode>,
    pub pods: Vec<PodResources>,
    pub usage: Vec<PodUsage>,
    pub fail_nodes: AtomicBool,
    pub node_calls: AtomicUsize,
    pub pod_calls: AtomicUsize,
    pub usage_calls: AtomicUsize,
}

#[async_trait]
impl ClusterApi for MockCluster {
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        self.node_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_nodes.load(Ordering::SeqCst) {
            anyhow::bail!("api server unreachable");
        }
        Ok(self.nodes.clone())
    }

    async fn list_pods(&self, node_name: Option<&str>) -> Result<Vec<PodResources>> {
        self.pod_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pods
            .iter()
            .filter(|p| node_name.is_none() || p.node_name.as_deref() == node_name)
            .cloned()
            .collect())
    }

    async fn list_live_usage(&self) -> Result<Vec<PodUsage>> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.usage.clone())
    }
}

#[derive(Default)]
pub(crate) struct MockInventory {
    pub instances: Vec<InstanceFragment>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub queries: Mutex<Vec<InstanceQuery>>,
}

#[async_trait]
impl InventoryApi for MockInventory {
    async fn describe_instances(&self, query: &InstanceQuery) -> Result<Vec<InstanceFragment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let matches = self
            .instances
            .iter()
            .filter(|i| match query {
                InstanceQuery::Ids(ids) => ids.contains(&i.instance_id),
                InstanceQuery::PrivateIps(ips) => i
                    .private_ip
                    .as_ref()
                    .map(|ip| ips.contains(ip))
                    .unwrap_or(false),
            })
            .cloned()
            .collect();
        Ok(matches)
    }
}

#[derive(Default)]
pub(crate) struct MockPricing {
    pub prices: HashMap<String, Vec<PricedSku>>,
    pub delay: Option<Duration>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl MockPricing {
    pub fn with_price(mut self, machine_type: &str, usd: f64) -> Self {
        let n = self.prices.len();
        self.prices.entry(machine_type.to_string()).or_default().push(PricedSku {
            sku: format!("SKU-{machine_type}-{n}"),
            price_per_hour: usd,
            currency: "USD".to_string(),
        });
        self
    }
}

#[async_trait]
impl PricingApi for MockPricing {
    async fn lookup(
        &self,
        machine_type: &str,
        _location: &str,
        _term: PricingTerm,
    ) -> Result<Vec<PricedSku>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("pricing endpoint returned 503");
        }
        Ok(self.prices.get(machine_type).cloned().unwrap_or_default())
    }
}
