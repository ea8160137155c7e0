//! Interfaces to the external systems the reconciler depends on
//!
//! Concrete bindings (Kubernetes, cloud inventory, pricing catalog) live
//! outside this crate. Implementations convert their wire documents into
//! the typed records below and reject malformed shapes before returning.

use crate::models::{ClusterNode, InstanceFragment, PodResources, PodUsage};
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use async_trait::async_trait;

/// Cluster control-plane access
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List every node with identity, capacity and allocatable figures
    async fn list_nodes(&self) -> Result<Vec<ClusterNode>>;

    /// List pods with declared container resources, optionally for one node
    async fn list_pods(&self, node_name: Option<&str>) -> Result<Vec<PodResources>>;

    /// List live per-container usage samples for every pod
    async fn list_live_usage(&self) -> Result<Vec<PodUsage>>;
}

/// Selector for an inventory lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceQuery {
    /// Describe these instance ids
    Ids(Vec<String>),
    /// Describe instances owning any of these private IPs
    PrivateIps(Vec<String>),
}

impl InstanceQuery {
    pub fn is_empty(&self) -> bool {
        match self {
            InstanceQuery::Ids(v) | InstanceQuery::PrivateIps(v) => v.is_empty(),
        }
    }
}

/// Cloud inventory access
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// Describe instances in reservation order (first reservation's first instance first)
    async fn describe_instances(&self, query: &InstanceQuery) -> Result<Vec<InstanceFragment>>;
}

/// Pricing term to look up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PricingTerm {
    OnDemand,
}

impl PricingTerm {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingTerm::OnDemand => "OnDemand",
        }
    }
}

/// One priced SKU as returned by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedSku {
    pub sku: String,
    pub price_per_hour: f64,
    pub currency: String,
}

/// Cloud pricing catalog access
#[async_trait]
pub trait PricingApi: Send + Sync {
    /// SKUs matching the machine type, location and term, in catalog order
    async fn lookup(
        &self,
        machine_type: &str,
        location: &str,
        term: PricingTerm,
    ) -> Result<Vec<PricedSku>>;
}
