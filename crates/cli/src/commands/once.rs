//! Single reconciliation cycle

use anyhow::{Context, Result};
use nodecost_lib::Reconciler;

use crate::output::{print_summary, OutputFormat};

/// Run one cycle and print its summary; a skipped cycle is an error here
pub async fn run_once(reconciler: &Reconciler, format: OutputFormat) -> Result<()> {
    let summary = reconciler
        .run_cycle()
        .await
        .context("Reconciliation cycle failed")?;

    print_summary(&summary, format)
}
