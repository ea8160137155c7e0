//! Node to cloud instance resolution
//!
//! A node is matched to its billed instance by, in order:
//! 1. the instance id annotation, described through the inventory
//! 2. the node's internal IP, filtered through the inventory
//!
//! Lookups for a whole cycle are batched: annotated ids go out together and
//! the remaining internal IPs together, each split into chunks of at most
//! [`MAX_FILTER_VALUES`] so a large cluster stays within the inventory's
//! per-filter limit.

use crate::collaborators::{InstanceQuery, InventoryApi};
use crate::error::{bounded, ReconcileError};
use crate::models::{BillingLifecycle, InstanceFragment, NodeIdentity};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Annotation carrying the cloud instance id of a node
pub const INSTANCE_ID_ANNOTATION: &str = "node.kubernetes.io/instance-id";

/// Most values sent in one inventory filter
pub const MAX_FILTER_VALUES: usize = 200;

/// Instance matched to a node, before pricing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInstance {
    pub instance_id: String,
    pub machine_type: String,
    pub lifecycle: BillingLifecycle,
}

impl From<&InstanceFragment> for ResolvedInstance {
    fn from(fragment: &InstanceFragment) -> Self {
        Self {
            instance_id: fragment.instance_id.clone(),
            machine_type: fragment.machine_type.clone(),
            lifecycle: BillingLifecycle::from_inventory(fragment.lifecycle.as_deref()),
        }
    }
}

pub struct InstanceResolver {
    inventory: Arc<dyn InventoryApi>,
    timeout: Duration,
    chunk_size: usize,
}

impl InstanceResolver {
    pub fn new(inventory: Arc<dyn InventoryApi>, timeout: Duration) -> Self {
        Self {
            inventory,
            timeout,
            chunk_size: MAX_FILTER_VALUES,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Resolve a single node
    pub async fn resolve(&self, node: &NodeIdentity) -> Result<ResolvedInstance, ReconcileError> {
        self.resolve_all(&[node])
            .await
            .pop()
            .unwrap_or_else(|| {
                Err(ReconcileError::NotFound {
                    node: node.name.clone(),
                })
            })
    }

    /// Resolve every node, returning one result per node in input order.
    ///
    /// An inventory failure or timeout leaves the nodes of that chunk `NotFound`.
    pub async fn resolve_all(
        &self,
        nodes: &[&NodeIdentity],
    ) -> Vec<Result<ResolvedInstance, ReconcileError>> {
        let mut matches: Vec<Option<ResolvedInstance>> = vec![None; nodes.len()];

        let annotated: Vec<(usize, &str)> = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| {
                node.annotations
                    .get(INSTANCE_ID_ANNOTATION)
                    .map(|id| id.trim())
                    .filter(|id| !id.is_empty())
                    .map(|id| (i, id))
            })
            .collect();

        if !annotated.is_empty() {
            let ids = dedup(annotated.iter().map(|(_, id)| *id));
            let fragments = self.describe(ids, InstanceQuery::Ids).await;
            for (i, id) in &annotated {
                matches[*i] = fragments
                    .iter()
                    .find(|f| f.instance_id == *id)
                    .map(ResolvedInstance::from);
                if matches[*i].is_none() {
                    debug!(node = %nodes[*i].name, instance_id = %id, "Annotated instance not in inventory");
                }
            }
        }

        let by_ip: Vec<(usize, &str)> = (0..nodes.len())
            .filter(|i| matches[*i].is_none())
            .filter_map(|i| nodes[i].internal_ip().map(|ip| (i, ip)))
            .collect();

        if !by_ip.is_empty() {
            let ips = dedup(by_ip.iter().map(|(_, ip)| *ip));
            let fragments = self.describe(ips, InstanceQuery::PrivateIps).await;
            for (i, ip) in &by_ip {
                matches[*i] = fragments
                    .iter()
                    .find(|f| f.private_ip.as_deref() == Some(*ip))
                    .map(ResolvedInstance::from);
            }
        }

        matches
            .into_iter()
            .zip(nodes)
            .map(|(found, node)| {
                found.ok_or_else(|| ReconcileError::NotFound {
                    node: node.name.clone(),
                })
            })
            .collect()
    }

    async fn describe(
        &self,
        values: Vec<String>,
        query: fn(Vec<String>) -> InstanceQuery,
    ) -> Vec<InstanceFragment> {
        let mut fragments = Vec::new();
        for chunk in values.chunks(self.chunk_size) {
            let query = query(chunk.to_vec());
            match bounded(
                "inventory",
                self.timeout,
                self.inventory.describe_instances(&query),
            )
            .await
            {
                Ok(found) => fragments.extend(found),
                Err(e) => warn!(error = %e, query = ?query, "Inventory lookup failed"),
            }
        }
        fragments
    }
}

fn dedup<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}
