//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use nodecost_lib::{ClusterSummary, NodeSnapshot};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Width of utilization bars in cells
pub const BAR_WIDTH: usize = 20;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print an item as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(item: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format currency
pub fn format_currency(amount: f64, currency: &str) -> String {
    match currency {
        "USD" => format!("${:.4}", amount),
        "EUR" => format!("€{:.4}", amount),
        _ => format!("{:.4} {}", amount, currency),
    }
}

/// Format cores, dropping the fraction for whole numbers
pub fn format_cores(cores: f64) -> String {
    if cores.fract() == 0.0 {
        format!("{:.0}", cores)
    } else {
        format!("{:.2}", cores)
    }
}

pub fn format_gib(gib: f64) -> String {
    format!("{:.1}Gi", gib)
}

/// Fixed-width bar with the percentage appended, colored by level
pub fn utilization_bar(pct: f64, width: usize) -> String {
    let clamped = if pct.is_finite() { pct.clamp(0.0, 100.0) } else { 0.0 };
    let filled = ((clamped / 100.0) * width as f64).round() as usize;
    let bar = format!(
        "{}{} {:5.1}%",
        "█".repeat(filled),
        "░".repeat(width - filled),
        pct
    );

    if pct < 30.0 {
        bar.red().to_string()
    } else if pct < 80.0 {
        bar.yellow().to_string()
    } else {
        bar.green().to_string()
    }
}

/// Row for the node table
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Type")]
    machine_type: String,
    #[tabled(rename = "Lifecycle")]
    lifecycle: String,
    #[tabled(rename = "$/hour")]
    price: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "CPU Util")]
    cpu_util: String,
    #[tabled(rename = "Memory Util")]
    memory_util: String,
}

impl From<&NodeSnapshot> for NodeRow {
    fn from(snapshot: &NodeSnapshot) -> Self {
        let (machine_type, lifecycle, price) = match &snapshot.instance {
            Some(instance) => {
                let price = if instance.price.known {
                    format_currency(instance.price.usd_per_hour, "USD")
                } else {
                    format!("{} {}", format_currency(0.0, "USD"), "(unpriced)".yellow())
                };
                (
                    instance.machine_type.clone(),
                    instance.lifecycle.to_string(),
                    price,
                )
            }
            None => (
                "unresolved".red().to_string(),
                "-".to_string(),
                "-".to_string(),
            ),
        };

        NodeRow {
            node: snapshot.name().to_string(),
            machine_type,
            lifecycle,
            price,
            cpu: format_cores(snapshot.capacity.cpu_cores()),
            memory: format_gib(snapshot.capacity.memory_gib()),
            cpu_util: utilization_bar(snapshot.utilization.cpu_pct, BAR_WIDTH),
            memory_util: utilization_bar(snapshot.utilization.memory_pct, BAR_WIDTH),
        }
    }
}

/// Node table for a summary
pub fn node_table(summary: &ClusterSummary) -> String {
    let rows: Vec<NodeRow> = summary.nodes.iter().map(NodeRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// One-line cluster totals
pub fn summary_line(summary: &ClusterSummary) -> String {
    let mut line = format!(
        "{} {} nodes | avg CPU {:.1}% | avg memory {:.1}% | capacity {} cores / {} | {} {}/hour",
        "Cluster:".bold(),
        summary.node_count,
        summary.average_utilization.cpu_pct,
        summary.average_utilization.memory_pct,
        format_cores(summary.total_capacity.cpu_cores()),
        format_gib(summary.total_capacity.memory_gib()),
        "cost".bold(),
        format_currency(summary.total_cost_per_hour, "USD"),
    );

    if summary.failed_count > 0 {
        line.push_str(&format!(" | {} unresolved", summary.failed_count).red().to_string());
    }
    if summary.unpriced_count > 0 {
        line.push_str(&format!(" | {} unpriced", summary.unpriced_count).yellow().to_string());
    }
    line
}

/// Print a summary in the requested format
pub fn print_summary(summary: &ClusterSummary, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            if summary.nodes.is_empty() {
                println!("{}", "No nodes found".yellow());
                return Ok(());
            }
            println!("{}", node_table(summary));
            println!("{}", summary_line(summary));
            Ok(())
        }
    }
}

/// Clear the terminal and move the cursor home
pub fn clear_screen() {
    print!("\x1B[2J\x1B[1;1H");
}
