//! nodecost CLI
//!
//! Reconciles Kubernetes nodes with their cloud instances and prices, then
//! renders per-node cost and utilization once or on a refresh interval.

mod cloud;
mod cluster;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{once, prices, watch};
use nodecost_lib::ConsumptionMode;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Kubernetes node cost and utilization
#[derive(Parser)]
#[command(name = "nodecost")]
#[command(author, version, about = "Kubernetes node cost and utilization reconciler", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ~/.config/nodecost/config.{toml,json})
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// Cloud region of the cluster
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Pricing catalog location (derived from region if omitted)
    #[arg(long, global = true)]
    pub location: Option<String>,

    /// Cloud gateway base URL
    #[arg(long, global = true)]
    pub gateway_url: Option<String>,

    /// Consumption figures utilization is measured from
    #[arg(long, global = true)]
    pub mode: Option<ConsumptionMode>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Log as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh continuously until interrupted
    Watch {
        /// Seconds between cycles
        #[arg(long)]
        interval: Option<u64>,

        /// Serve health, metrics and the latest summary on this port
        #[arg(long)]
        listen: Option<u16>,
    },

    /// Run a single cycle and print it
    Once,

    /// Look up on-demand prices for machine types
    Prices {
        /// Machine types, e.g. m5.xlarge
        #[arg(required = true)]
        machine_types: Vec<String>,
    },
}

/// Logs go to stderr so rendered output on stdout stays clean
fn init_logging(json: bool, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json, cli.verbose);

    let interval = match &cli.command {
        Commands::Watch { interval, .. } => *interval,
        _ => None,
    };
    let settings = config::Settings::load(cli.config.as_deref())?.apply(config::Overrides {
        region: cli.region,
        pricing_location: cli.location,
        gateway_url: cli.gateway_url,
        kube_context: cli.context,
        interval_secs: interval,
        mode: cli.mode,
    });

    match cli.command {
        Commands::Watch { listen, .. } => {
            if settings.interval_secs == 0 {
                anyhow::bail!("Interval must be at least one second");
            }
            let reconciler =
                commands::build_reconciler(&settings, cli.kubeconfig.as_deref()).await?;
            watch::watch(reconciler, settings.interval(), cli.format, listen).await?;
        }
        Commands::Once => {
            let reconciler =
                commands::build_reconciler(&settings, cli.kubeconfig.as_deref()).await?;
            once::run_once(&reconciler, cli.format).await?;
        }
        Commands::Prices { machine_types } => {
            prices::show_prices(&settings, &machine_types, cli.format).await?;
        }
    }

    Ok(())
}
