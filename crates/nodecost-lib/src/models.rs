//! Core data models for node cost reconciliation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical unit of a normalized quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// vCPU cores
    CpuCores,
    /// Memory in GiB
    MemoryGib,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::CpuCores => write!(f, "cpu"),
            ResourceKind::MemoryGib => write!(f, "memory"),
        }
    }
}

/// A non-negative amount expressed in its canonical unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuantity {
    value: f64,
    kind: ResourceKind,
}

impl ResourceQuantity {
    pub(crate) fn new(value: f64, kind: ResourceKind) -> Self {
        Self {
            value: value.max(0.0),
            kind,
        }
    }

    pub fn zero(kind: ResourceKind) -> Self {
        Self::new(0.0, kind)
    }

    pub fn cores(value: f64) -> Self {
        Self::new(value, ResourceKind::CpuCores)
    }

    pub fn gib(value: f64) -> Self {
        Self::new(value, ResourceKind::MemoryGib)
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

/// CPU and memory pair in canonical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeResources {
    pub cpu: ResourceQuantity,
    pub memory: ResourceQuantity,
}

impl Default for NodeResources {
    fn default() -> Self {
        Self {
            cpu: ResourceQuantity::zero(ResourceKind::CpuCores),
            memory: ResourceQuantity::zero(ResourceKind::MemoryGib),
        }
    }
}

impl NodeResources {
    pub fn new(cpu_cores: f64, memory_gib: f64) -> Self {
        Self {
            cpu: ResourceQuantity::cores(cpu_cores),
            memory: ResourceQuantity::gib(memory_gib),
        }
    }

    pub fn cpu_cores(&self) -> f64 {
        self.cpu.value()
    }

    pub fn memory_gib(&self) -> f64 {
        self.memory.value()
    }

    pub fn add(&mut self, other: &NodeResources) {
        *self = NodeResources::new(
            self.cpu_cores() + other.cpu_cores(),
            self.memory_gib() + other.memory_gib(),
        );
    }
}

/// Raw, unparsed cpu/memory quantity strings as emitted by the cluster API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResources {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

/// Node address type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressType {
    InternalIp,
    ExternalIp,
    Hostname,
    InternalDns,
    ExternalDns,
    Other(String),
}

impl AddressType {
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "InternalIP" => AddressType::InternalIp,
            "ExternalIP" => AddressType::ExternalIp,
            "Hostname" => AddressType::Hostname,
            "InternalDNS" => AddressType::InternalDns,
            "ExternalDNS" => AddressType::ExternalDns,
            other => AddressType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub kind: AddressType,
    pub address: String,
}

/// Identity metadata of a cluster node, read-only within the core
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub name: String,
    pub addresses: Vec<NodeAddress>,
    pub annotations: BTreeMap<String, String>,
}

impl NodeIdentity {
    /// First address tagged as internal IP
    pub fn internal_ip(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.kind == AddressType::InternalIp)
            .map(|a| a.address.as_str())
    }
}

/// Node as listed by the cluster API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterNode {
    pub identity: NodeIdentity,
    pub capacity: RawResources,
    pub allocatable: RawResources,
}

/// Declared resources of one container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerResources {
    pub name: String,
    pub requests: RawResources,
    pub limits: RawResources,
}

/// Pod with its scheduled node and declared container resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodResources {
    pub namespace: String,
    pub name: String,
    pub node_name: Option<String>,
    pub phase: Option<String>,
    pub containers: Vec<ContainerResources>,
}

impl PodResources {
    /// Terminated pods hold no resources on their node
    pub fn is_terminated(&self) -> bool {
        matches!(self.phase.as_deref(), Some("Succeeded") | Some("Failed"))
    }
}

/// Live usage sample for one container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerUsage {
    pub name: String,
    pub usage: RawResources,
}

/// Live usage samples for one pod, keyed by namespace/name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodUsage {
    pub namespace: String,
    pub name: String,
    pub containers: Vec<ContainerUsage>,
}

/// Billing lifecycle of the underlying cloud instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BillingLifecycle {
    OnDemand,
    Spot,
}

impl BillingLifecycle {
    /// Read the inventory lifecycle field; absence means on-demand.
    ///
    /// Scheduled and capacity-block instances are billed at fixed
    /// on-demand-style rates and are reported as on-demand.
    pub fn from_inventory(field: Option<&str>) -> Self {
        match field {
            Some(value) if value.eq_ignore_ascii_case("spot") => BillingLifecycle::Spot,
            _ => BillingLifecycle::OnDemand,
        }
    }
}

impl fmt::Display for BillingLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingLifecycle::OnDemand => write!(f, "On-Demand"),
            BillingLifecycle::Spot => write!(f, "Spot"),
        }
    }
}

/// Instance fragment returned by the inventory collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceFragment {
    pub instance_id: String,
    pub machine_type: String,
    pub lifecycle: Option<String>,
    pub private_ip: Option<String>,
}

/// Hourly price and whether the catalog actually knew it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub usd_per_hour: f64,
    pub known: bool,
}

impl Price {
    pub fn known(usd_per_hour: f64) -> Self {
        Self {
            usd_per_hour,
            known: true,
        }
    }

    /// Sentinel for instance types the catalog cannot price
    pub fn unknown() -> Self {
        Self {
            usd_per_hour: 0.0,
            known: false,
        }
    }
}

/// A node's billed cloud instance, resolved once per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub machine_type: String,
    pub lifecycle: BillingLifecycle,
    pub price: Price,
}

/// Utilization percentages
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    pub cpu_pct: f64,
    pub memory_pct: f64,
}

/// Immutable per-cycle view of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub identity: NodeIdentity,
    /// `None` when the node could not be matched to an instance
    pub instance: Option<InstanceRecord>,
    pub capacity: NodeResources,
    pub allocatable: NodeResources,
    pub consumed: NodeResources,
    pub utilization: Utilization,
}

impl NodeSnapshot {
    pub fn is_resolved(&self) -> bool {
        self.instance.is_some()
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }
}

/// Which consumption figures a cycle measures utilization from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumptionMode {
    /// Sum of declared container requests
    #[default]
    Requests,
    /// Sum of declared container limits
    Limits,
    /// Sum of live usage samples from the metrics API
    Usage,
}

impl fmt::Display for ConsumptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumptionMode::Requests => write!(f, "requests"),
            ConsumptionMode::Limits => write!(f, "limits"),
            ConsumptionMode::Usage => write!(f, "usage"),
        }
    }
}

impl std::str::FromStr for ConsumptionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "requests" => Ok(ConsumptionMode::Requests),
            "limits" => Ok(ConsumptionMode::Limits),
            "usage" => Ok(ConsumptionMode::Usage),
            other => Err(format!(
                "unknown consumption mode '{other}' (expected requests, limits or usage)"
            )),
        }
    }
}

/// Cluster-wide result of one reconciliation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub mode: ConsumptionMode,
    /// Snapshots in cluster list order, unresolved nodes included
    pub nodes: Vec<NodeSnapshot>,
    pub total_cost_per_hour: f64,
    pub total_capacity: NodeResources,
    pub total_allocatable: NodeResources,
    pub total_consumed: NodeResources,
    /// Mean over resolved nodes only
    pub average_utilization: Utilization,
    /// Number of resolved nodes
    pub node_count: usize,
    /// Nodes that failed reconciliation
    pub failed_count: usize,
    /// Resolved nodes priced at the unknown sentinel
    pub unpriced_count: usize,
}

impl ClusterSummary {
    /// Fold snapshots into totals; unresolved nodes are listed but contribute nothing
    pub fn aggregate(mode: ConsumptionMode, nodes: Vec<NodeSnapshot>) -> Self {
        let mut total_cost_per_hour = 0.0;
        let mut total_capacity = NodeResources::default();
        let mut total_allocatable = NodeResources::default();
        let mut total_consumed = NodeResources::default();
        let mut cpu_pct_sum = 0.0;
        let mut memory_pct_sum = 0.0;
        let mut node_count = 0;
        let mut unpriced_count = 0;

        for snapshot in &nodes {
            let Some(instance) = &snapshot.instance else {
                continue;
            };
            total_cost_per_hour += instance.price.usd_per_hour;
            if !instance.price.known {
                unpriced_count += 1;
            }
            total_capacity.add(&snapshot.capacity);
            total_allocatable.add(&snapshot.allocatable);
            total_consumed.add(&snapshot.consumed);
            cpu_pct_sum += snapshot.utilization.cpu_pct;
            memory_pct_sum += snapshot.utilization.memory_pct;
            node_count += 1;
        }

        let average_utilization = if node_count > 0 {
            Utilization {
                cpu_pct: cpu_pct_sum / node_count as f64,
                memory_pct: memory_pct_sum / node_count as f64,
            }
        } else {
            Utilization::default()
        };

        let failed_count = nodes.len() - node_count;

        Self {
            mode,
            nodes,
            total_cost_per_hour,
            total_capacity,
            total_allocatable,
            total_consumed,
            average_utilization,
            node_count,
            failed_count,
            unpriced_count,
        }
    }
}
