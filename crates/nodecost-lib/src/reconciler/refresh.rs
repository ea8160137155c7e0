//! Refresh loop
//!
//! Drives the reconciler on a fixed interval and publishes one report per
//! cycle. A shutdown signal received mid-cycle drops the in-flight cycle so
//! partial results are never published.

use super::Reconciler;
use crate::error::ReconcileError;
use crate::health::HealthRegistry;
use crate::models::ClusterSummary;
use crate::observability::{ReconcilerMetrics, StructuredLogger};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the refresh loop
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between cycle starts (default: 30 seconds)
    pub interval: Duration,
    /// Channel buffer size for cycle reports
    pub buffer_size: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            buffer_size: 16,
        }
    }
}

/// Result of one cycle as seen by presenters
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(Arc<ClusterSummary>),
    /// A bulk fetch failed; the previous summary remains current
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn summary(&self) -> Option<&Arc<ClusterSummary>> {
        match &self.outcome {
            CycleOutcome::Completed(summary) => Some(summary),
            CycleOutcome::Skipped(_) => None,
        }
    }
}

pub struct RefreshLoop {
    reconciler: Arc<Reconciler>,
    config: RefreshConfig,
    reports_tx: mpsc::Sender<CycleReport>,
    health: Option<HealthRegistry>,
    metrics: ReconcilerMetrics,
}

impl RefreshLoop {
    pub fn new(
        reconciler: Arc<Reconciler>,
        config: RefreshConfig,
    ) -> (Self, mpsc::Receiver<CycleReport>) {
        let (reports_tx, reports_rx) = mpsc::channel(config.buffer_size.max(1));

        let refresh = Self {
            reconciler,
            config,
            reports_tx,
            health: None,
            metrics: ReconcilerMetrics::new(),
        };

        (refresh, reports_rx)
    }

    fn logger(&self) -> &StructuredLogger {
        self.reconciler.logger()
    }

    /// Run until shutdown is signalled or the report receiver is dropped
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        self.logger()
            .log_loop_started(self.config.interval, self.reconciler.config().mode);

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => {
                    self.logger().log_loop_stopped("shutdown signal");
                    break;
                }
            }

            cycle += 1;
            let start = Instant::now();

            let result = tokio::select! {
                result = self.reconciler.run_cycle() => result,
                _ = shutdown.recv() => {
                    self.logger().log_cycle_abandoned(cycle);
                    self.logger().log_loop_stopped("shutdown signal");
                    break;
                }
            };

            let report = self.finish(cycle, result, start.elapsed()).await;
            if self.reports_tx.send(report).await.is_err() {
                info!("Report receiver closed, stopping refresh loop");
                break;
            }
        }
    }

    async fn finish(
        &self,
        cycle: u64,
        result: Result<ClusterSummary, ReconcileError>,
        elapsed: Duration,
    ) -> CycleReport {
        let outcome = match result {
            Ok(summary) => {
                self.metrics.record_cycle(&summary, elapsed);
                self.logger().log_cycle_completed(cycle, &summary, elapsed);
                if let Some(health) = &self.health {
                    health.observe_summary(&summary).await;
                }
                CycleOutcome::Completed(Arc::new(summary))
            }
            Err(e) => {
                self.metrics.inc_cycles_skipped();
                self.logger().log_cycle_skipped(cycle, &e);
                if let Some(health) = &self.health {
                    health.observe_skipped(&e).await;
                }
                CycleOutcome::Skipped(e.to_string())
            }
        };

        debug!(cycle = cycle, elapsed_ms = elapsed.as_millis() as u64, "Cycle finished");

        CycleReport {
            cycle,
            finished_at: Utc::now(),
            elapsed,
            outcome,
        }
    }
}

/// Builder for creating the refresh loop
pub struct RefreshLoopBuilder {
    reconciler: Option<Arc<Reconciler>>,
    health: Option<HealthRegistry>,
    config: RefreshConfig,
}

impl RefreshLoopBuilder {
    pub fn new() -> Self {
        Self {
            reconciler: None,
            health: None,
            config: RefreshConfig::default(),
        }
    }

    pub fn reconciler(mut self, reconciler: Arc<Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Registry updated after every cycle
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    pub fn build(self) -> Result<(RefreshLoop, mpsc::Receiver<CycleReport>)> {
        let reconciler = self
            .reconciler
            .ok_or_else(|| anyhow::anyhow!("Reconciler is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Refresh interval must be greater than zero");
        }

        let (mut refresh, rx) = RefreshLoop::new(reconciler, self.config);
        refresh.health = self.health;
        Ok((refresh, rx))
    }
}

impl Default for RefreshLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
