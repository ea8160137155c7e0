//! Configuration management for the CLI
//!
//! Settings are layered: built-in defaults, then the optional config file,
//! then `NODECOST_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use nodecost_lib::pricing::location_for_region;
use nodecost_lib::{ConsumptionMode, ReconcilerConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved CLI settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Cloud region the cluster runs in
    #[serde(default = "default_region")]
    pub region: String,

    /// Pricing catalog location; derived from the region when absent
    #[serde(default)]
    pub pricing_location: Option<String>,

    /// Base URL of the cloud gateway serving inventory and pricing
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Kubeconfig context to use instead of the current one
    #[serde(default)]
    pub kube_context: Option<String>,

    /// Seconds between refresh cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub mode: ConsumptionMode,

    /// Nodes priced concurrently per cycle
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for each collaborator call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Price cache entry lifetime; entries never expire when absent
    #[serde(default)]
    pub price_ttl_secs: Option<u64>,
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

fn default_gateway_url() -> String {
    "http://localhost:8787".to_string()
}

fn default_interval_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: default_region(),
            pricing_location: None,
            gateway_url: default_gateway_url(),
            kube_context: None,
            interval_secs: default_interval_secs(),
            mode: ConsumptionMode::default(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            price_ttl_secs: None,
        }
    }
}

/// Values given on the command line; `None` keeps the layered value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub pricing_location: Option<String>,
    pub gateway_url: Option<String>,
    pub kube_context: Option<String>,
    pub interval_secs: Option<u64>,
    pub mode: Option<ConsumptionMode>,
}

impl Settings {
    /// Load settings from the config file and environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => {
                let base = Self::default_path()?;
                config::File::from(base).required(false)
            }
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("NODECOST").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Default config file stem; any supported extension is accepted
    fn default_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("nodecost").join("config"))
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(region) = overrides.region {
            self.region = region;
        }
        if overrides.pricing_location.is_some() {
            self.pricing_location = overrides.pricing_location;
        }
        if let Some(url) = overrides.gateway_url {
            self.gateway_url = url;
        }
        if overrides.kube_context.is_some() {
            self.kube_context = overrides.kube_context;
        }
        if let Some(secs) = overrides.interval_secs {
            self.interval_secs = secs;
        }
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        self
    }

    /// Catalog location for price lookups
    pub fn pricing_location(&self) -> Result<String> {
        if let Some(location) = &self.pricing_location {
            return Ok(location.clone());
        }
        location_for_region(&self.region)
            .map(str::to_string)
            .with_context(|| {
                format!(
                    "No pricing location known for region '{}'; set pricing_location",
                    self.region
                )
            })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn reconciler_config(&self) -> Result<ReconcilerConfig> {
        Ok(ReconcilerConfig {
            mode: self.mode,
            location: self.pricing_location()?,
            concurrency: self.concurrency,
            timeout: self.timeout(),
            price_ttl: self.price_ttl_secs.map(Duration::from_secs),
        })
    }
}
