//! Continuous refresh with terminal rendering

use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use nodecost_lib::api::{self, AppState};
use nodecost_lib::reconciler::CycleOutcome;
use nodecost_lib::{
    ClusterSummary, CycleReport, HealthRegistry, Reconciler, ReconcilerMetrics,
    RefreshLoopBuilder,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};

use crate::output::{
    clear_screen, node_table, print_error, print_info, print_warning, summary_line, OutputFormat,
};

/// Renders cycle reports, keeping the last good summary on screen
struct Presenter {
    format: OutputFormat,
    last: Option<(u64, Arc<ClusterSummary>)>,
}

impl Presenter {
    fn new(format: OutputFormat) -> Self {
        Self { format, last: None }
    }

    fn render(&mut self, report: &CycleReport) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.render_json(report),
            OutputFormat::Table => {
                self.render_table(report);
                Ok(())
            }
        }
    }

    /// One JSON document per completed cycle
    fn render_json(&mut self, report: &CycleReport) -> Result<()> {
        match &report.outcome {
            CycleOutcome::Completed(summary) => {
                println!("{}", serde_json::to_string(summary.as_ref())?);
                self.last = Some((report.cycle, summary.clone()));
            }
            CycleOutcome::Skipped(reason) => {
                print_error(&format!("cycle {} skipped: {}", report.cycle, reason));
            }
        }
        Ok(())
    }

    fn render_table(&mut self, report: &CycleReport) {
        if let CycleOutcome::Completed(summary) = &report.outcome {
            self.last = Some((report.cycle, summary.clone()));
        }

        clear_screen();

        match &self.last {
            Some((cycle, summary)) => {
                println!(
                    "{} mode={} cycle={} updated {}",
                    "nodecost".bold(),
                    summary.mode,
                    cycle,
                    report.finished_at.with_timezone(&Local).format("%H:%M:%S"),
                );
                if summary.nodes.is_empty() {
                    println!("{}", "No nodes found".yellow());
                } else {
                    println!("{}", node_table(summary));
                }
                println!("{}", summary_line(summary));
            }
            None => print_info("Waiting for the first successful cycle"),
        }

        if let CycleOutcome::Skipped(reason) = &report.outcome {
            print_warning(&format!(
                "Cycle {} skipped ({}); showing the last good summary",
                report.cycle, reason
            ));
        }
    }
}

/// Render reports until the channel closes or `interrupt` resolves.
///
/// `interrupt` is polled across iterations, so a signal delivered while a
/// report is being rendered is not lost.
async fn present_until<F>(
    reports: &mut mpsc::Receiver<CycleReport>,
    presenter: &mut Presenter,
    state: &AppState,
    interrupt: F,
) -> Result<()>
where
    F: Future,
{
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            report = reports.recv() => match report {
                Some(report) => {
                    if let Some(summary) = report.summary() {
                        state.publish(summary.clone()).await;
                    }
                    presenter.render(&report)?;
                }
                None => return Ok(()),
            },
            _ = &mut interrupt => {
                info!("Interrupt received, shutting down");
                return Ok(());
            }
        }
    }
}

/// Refresh until interrupted; exits cleanly on Ctrl-C
pub async fn watch(
    reconciler: Reconciler,
    interval: Duration,
    format: OutputFormat,
    listen: Option<u16>,
) -> Result<()> {
    let health = HealthRegistry::new();
    health.register_all().await;
    let state = Arc::new(AppState::new(health.clone(), ReconcilerMetrics::new()));

    let api_handle = listen.map(|port| {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state).await {
                error!(port = port, error = %e, "API server failed");
            }
        })
    });

    let (refresh, mut reports) = RefreshLoopBuilder::new()
        .reconciler(Arc::new(reconciler))
        .health(health)
        .interval(interval)
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(refresh.run(shutdown_rx));

    let mut presenter = Presenter::new(format);
    present_until(&mut reports, &mut presenter, &state, tokio::signal::ctrl_c()).await?;

    // The loop may already be gone if the receiver closed
    let _ = shutdown_tx.send(());
    drop(reports);
    loop_handle.await.context("Refresh loop panicked")?;

    if let Some(handle) = api_handle {
        handle.abort();
    }

    Ok(())
}
