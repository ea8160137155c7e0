//! Observability infrastructure for the reconciler
//!
//! Provides:
//! - Prometheus metrics (cycle latency, node counts, cluster cost, price cache)
//! - Structured logging of cycle events with tracing

use crate::models::{ClusterSummary, ConsumptionMode};
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_gauge, Gauge, GaugeVec, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ReconcilerMetricsInner> = OnceLock::new();

struct ReconcilerMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_completed: IntCounter,
    cycles_skipped: IntCounter,
    nodes_resolved: IntGauge,
    nodes_unresolved: IntGauge,
    nodes_unpriced: IntGauge,
    cluster_cost_per_hour: Gauge,
    average_utilization: GaugeVec,
    price_cache_hits: IntCounter,
    price_cache_misses: IntCounter,
    pricing_calls: IntCounter,
}

impl ReconcilerMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "nodecost_cycle_duration_seconds",
                "Time spent running one reconciliation cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_completed: register_int_counter!(
                "nodecost_cycles_completed_total",
                "Reconciliation cycles that produced a cluster summary"
            )
            .expect("Failed to register cycles_completed"),

            cycles_skipped: register_int_counter!(
                "nodecost_cycles_skipped_total",
                "Reconciliation cycles skipped because a bulk fetch failed"
            )
            .expect("Failed to register cycles_skipped"),

            nodes_resolved: register_int_gauge!(
                "nodecost_nodes_resolved",
                "Nodes matched to a cloud instance in the last cycle"
            )
            .expect("Failed to register nodes_resolved"),

            nodes_unresolved: register_int_gauge!(
                "nodecost_nodes_unresolved",
                "Nodes that could not be matched to a cloud instance in the last cycle"
            )
            .expect("Failed to register nodes_unresolved"),

            nodes_unpriced: register_int_gauge!(
                "nodecost_nodes_unpriced",
                "Resolved nodes whose machine type had no catalog price in the last cycle"
            )
            .expect("Failed to register nodes_unpriced"),

            cluster_cost_per_hour: register_gauge!(
                "nodecost_cluster_cost_usd_per_hour",
                "Total on-demand hourly cost of resolved nodes"
            )
            .expect("Failed to register cluster_cost_per_hour"),

            average_utilization: register_gauge_vec!(
                "nodecost_average_utilization_percent",
                "Average utilization across resolved nodes",
                &["resource", "mode"]
            )
            .expect("Failed to register average_utilization"),

            price_cache_hits: register_int_counter!(
                "nodecost_price_cache_hits_total",
                "Price lookups answered from cache"
            )
            .expect("Failed to register price_cache_hits"),

            price_cache_misses: register_int_counter!(
                "nodecost_price_cache_misses_total",
                "Price lookups that waited on the pricing catalog"
            )
            .expect("Failed to register price_cache_misses"),

            pricing_calls: register_int_counter!(
                "nodecost_pricing_calls_total",
                "Requests sent to the pricing catalog"
            )
            .expect("Failed to register pricing_calls"),
        }
    }
}

/// Reconciler metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ReconcilerMetrics {
    _private: (),
}

impl Default for ReconcilerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcilerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ReconcilerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ReconcilerMetricsInner {
        GLOBAL_METRICS.get_or_init(ReconcilerMetricsInner::new)
    }

    /// Record a completed cycle and publish its summary figures
    pub fn record_cycle(&self, summary: &ClusterSummary, elapsed: Duration) {
        let inner = self.inner();
        inner.cycle_duration_seconds.observe(elapsed.as_secs_f64());
        inner.cycles_completed.inc();
        inner.nodes_resolved.set(summary.node_count as i64);
        inner.nodes_unresolved.set(summary.failed_count as i64);
        inner.nodes_unpriced.set(summary.unpriced_count as i64);
        inner.cluster_cost_per_hour.set(summary.total_cost_per_hour);

        let mode = summary.mode.to_string();
        inner.average_utilization.reset();
        inner
            .average_utilization
            .with_label_values(&["cpu", &mode])
            .set(summary.average_utilization.cpu_pct);
        inner
            .average_utilization
            .with_label_values(&["memory", &mode])
            .set(summary.average_utilization.memory_pct);
    }

    pub fn inc_cycles_skipped(&self) {
        self.inner().cycles_skipped.inc();
    }

    pub fn inc_price_cache_hits(&self) {
        self.inner().price_cache_hits.inc();
    }

    pub fn inc_price_cache_misses(&self) {
        self.inner().price_cache_misses.inc();
    }

    pub fn inc_pricing_calls(&self) {
        self.inner().pricing_calls.inc();
    }
}

/// Structured logger for reconciliation events
#[derive(Clone)]
pub struct StructuredLogger {
    cluster: String,
}

impl StructuredLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn log_loop_started(&self, interval: Duration, mode: ConsumptionMode) {
        info!(
            event = "loop_started",
            cluster = %self.cluster,
            interval_secs = interval.as_secs(),
            mode = %mode,
            "Refresh loop started"
        );
    }

    pub fn log_loop_stopped(&self, reason: &str) {
        info!(
            event = "loop_stopped",
            cluster = %self.cluster,
            reason = %reason,
            "Refresh loop stopped"
        );
    }

    pub fn log_cycle_completed(&self, cycle: u64, summary: &ClusterSummary, elapsed: Duration) {
        info!(
            event = "cycle_completed",
            cluster = %self.cluster,
            cycle = cycle,
            nodes = summary.nodes.len(),
            resolved = summary.node_count,
            unresolved = summary.failed_count,
            unpriced = summary.unpriced_count,
            cost_per_hour = summary.total_cost_per_hour,
            avg_cpu_pct = summary.average_utilization.cpu_pct,
            avg_memory_pct = summary.average_utilization.memory_pct,
            elapsed_ms = elapsed.as_millis() as u64,
            "Reconciliation cycle complete"
        );
    }

    pub fn log_cycle_skipped(&self, cycle: u64, error: &dyn std::error::Error) {
        warn!(
            event = "cycle_skipped",
            cluster = %self.cluster,
            cycle = cycle,
            error = %error,
            "Bulk fetch failed, skipping cycle"
        );
    }

    pub fn log_cycle_abandoned(&self, cycle: u64) {
        warn!(
            event = "cycle_abandoned",
            cluster = %self.cluster,
            cycle = cycle,
            "Shutdown during cycle, discarding partial results"
        );
    }

    pub fn log_node_unresolved(&self, node: &str, reason: &str) {
        warn!(
            event = "node_unresolved",
            cluster = %self.cluster,
            node = %node,
            reason = %reason,
            "Node excluded from totals"
        );
    }

    pub fn log_price_unavailable(&self, node: &str, machine_type: &str, reason: &str) {
        warn!(
            event = "price_unavailable",
            cluster = %self.cluster,
            node = %node,
            machine_type = %machine_type,
            reason = %reason,
            "Pricing node at 0.0"
        );
    }
}
