//! Cluster reconciliation
//!
//! One cycle moves through `Collecting -> Resolving -> Pricing -> Aggregating`.
//! Bulk fetches happen once per cycle per collaborator; failures there abort
//! the cycle. Per-node failures are recorded on the node and the cycle
//! carries on.

mod refresh;

#[cfg(test)]
mod tests;

pub use refresh::{CycleOutcome, CycleReport, RefreshConfig, RefreshLoop, RefreshLoopBuilder};

use crate::collaborators::{ClusterApi, InventoryApi, PricingApi};
use crate::error::{bounded, ReconcileError};
use crate::models::{
    ClusterNode, ClusterSummary, ConsumptionMode, InstanceRecord, NodeIdentity, NodeSnapshot,
    Price,
};
use crate::observability::StructuredLogger;
use crate::pricing::{PriceCache, PriceCacheConfig};
use crate::resolver::{InstanceResolver, ResolvedInstance};
use crate::utilization::{self, parse_resources, ConsumptionIndex};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reconciliation cycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Collecting,
    Resolving,
    Pricing,
    Aggregating,
    Done,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Collecting => "collecting",
            CyclePhase::Resolving => "resolving",
            CyclePhase::Pricing => "pricing",
            CyclePhase::Aggregating => "aggregating",
            CyclePhase::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Configuration for the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Which consumption figures utilization is measured from
    pub mode: ConsumptionMode,
    /// Pricing catalog location descriptor, e.g. "EU (Ireland)"
    pub location: String,
    /// Nodes processed concurrently during pricing
    pub concurrency: usize,
    /// Deadline for every collaborator call
    pub timeout: Duration,
    /// Price cache entry lifetime; `None` never expires
    pub price_ttl: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            mode: ConsumptionMode::Requests,
            location: "EU (Ireland)".to_string(),
            concurrency: 8,
            timeout: Duration::from_secs(10),
            price_ttl: None,
        }
    }
}

/// Runs reconciliation cycles; holds no cycle-to-cycle state besides the price cache
pub struct Reconciler {
    cluster: Arc<dyn ClusterApi>,
    resolver: InstanceResolver,
    prices: PriceCache,
    config: ReconcilerConfig,
    logger: StructuredLogger,
}

impl Reconciler {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        inventory: Arc<dyn InventoryApi>,
        pricing: Arc<dyn PricingApi>,
        config: ReconcilerConfig,
    ) -> Self {
        let resolver = InstanceResolver::new(inventory, config.timeout);
        let prices = PriceCache::new(
            pricing,
            PriceCacheConfig {
                ttl: config.price_ttl,
                timeout: config.timeout,
            },
        );

        Self {
            cluster,
            resolver,
            prices,
            config,
            logger: StructuredLogger::new("default"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn price_cache(&self) -> &PriceCache {
        &self.prices
    }

    /// Run one full cycle and produce an immutable summary
    pub async fn run_cycle(&self) -> Result<ClusterSummary, ReconcileError> {
        debug!(phase = %CyclePhase::Collecting, mode = %self.config.mode, "Cycle phase");
        let (nodes, consumption) = self.collect().await?;
        if consumption.skipped() > 0 {
            debug!(skipped = consumption.skipped(), "Malformed quantities skipped");
        }

        debug!(phase = %CyclePhase::Resolving, nodes = nodes.len(), "Cycle phase");
        let identities: Vec<&NodeIdentity> = nodes.iter().map(|n| &n.identity).collect();
        let resolutions = self.resolver.resolve_all(&identities).await;

        debug!(phase = %CyclePhase::Pricing, "Cycle phase");
        let consumption = &consumption;
        // Boxed up front so the cycle future stays Send for tokio::spawn
        let pending: Vec<BoxFuture<'_, NodeSnapshot>> = nodes
            .iter()
            .zip(resolutions)
            .map(|(node, resolution)| self.build_snapshot(node, resolution, consumption).boxed())
            .collect();
        let snapshots: Vec<NodeSnapshot> = stream::iter(pending)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        debug!(phase = %CyclePhase::Aggregating, "Cycle phase");
        let summary = ClusterSummary::aggregate(self.config.mode, snapshots);

        debug!(phase = %CyclePhase::Done, resolved = summary.node_count, "Cycle phase");
        Ok(summary)
    }

    /// Bulk-fetch nodes and the consumption source for the configured mode
    async fn collect(&self) -> Result<(Vec<ClusterNode>, ConsumptionIndex), ReconcileError> {
        let timeout = self.config.timeout;
        let nodes = bounded("cluster_api", timeout, self.cluster.list_nodes()).await?;

        let consumption = match self.config.mode {
            ConsumptionMode::Requests | ConsumptionMode::Limits => {
                let pods = bounded("cluster_api", timeout, self.cluster.list_pods(None)).await?;
                ConsumptionIndex::from_declared(&pods, self.config.mode)
            }
            ConsumptionMode::Usage => {
                let (pods, usage) = tokio::try_join!(
                    bounded("cluster_api", timeout, self.cluster.list_pods(None)),
                    bounded("metrics_api", timeout, self.cluster.list_live_usage()),
                )?;
                ConsumptionIndex::from_usage(&pods, &usage)
            }
        };

        Ok((nodes, consumption))
    }

    async fn build_snapshot(
        &self,
        node: &ClusterNode,
        resolution: Result<ResolvedInstance, ReconcileError>,
        consumption: &ConsumptionIndex,
    ) -> NodeSnapshot {
        let name = node.identity.name.as_str();
        let (capacity, _) = parse_resources(&node.capacity, name);
        let (allocatable, _) = parse_resources(&node.allocatable, name);
        let consumed = consumption.for_node(name);

        let instance = match resolution {
            Ok(resolved) => Some(self.price(name, resolved).await),
            Err(e) => {
                self.logger.log_node_unresolved(name, &e.to_string());
                None
            }
        };

        NodeSnapshot {
            identity: node.identity.clone(),
            instance,
            capacity,
            allocatable,
            consumed,
            utilization: utilization::compute(&capacity, &consumed),
        }
    }

    async fn price(&self, node: &str, resolved: ResolvedInstance) -> InstanceRecord {
        let price = match self
            .prices
            .get_price(&resolved.machine_type, &self.config.location)
            .await
        {
            Ok(price) => {
                if !price.known {
                    self.logger
                        .log_price_unavailable(node, &resolved.machine_type, "no matching SKU");
                }
                price
            }
            Err(e) => {
                self.logger
                    .log_price_unavailable(node, &resolved.machine_type, &e.to_string());
                Price::unknown()
            }
        };

        InstanceRecord {
            instance_id: resolved.instance_id,
            machine_type: resolved.machine_type,
            lifecycle: resolved.lifecycle,
            price,
        }
    }
}
