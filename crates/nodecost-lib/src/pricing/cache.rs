//! Memoizing price lookups
//!
//! Entries are keyed by machine type and pricing location. Reads of a
//! populated entry never touch the catalog. A miss installs a per-key cell
//! so that concurrent callers for the same key wait on a single in-flight
//! catalog request instead of issuing their own.

use crate::collaborators::{PricedSku, PricingApi, PricingTerm};
use crate::error::{bounded, ReconcileError};
use crate::models::Price;
use crate::observability::ReconcilerMetrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Currency the catalog rate is read in
const CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriceKey {
    pub machine_type: String,
    pub location: String,
}

impl PriceKey {
    pub fn new(machine_type: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            machine_type: machine_type.into(),
            location: location.into(),
        }
    }
}

/// A cached price with the time it was fetched
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceEntry {
    pub price: Price,
    pub fetched_at: DateTime<Utc>,
}

/// Configuration for the price cache
#[derive(Debug, Clone)]
pub struct PriceCacheConfig {
    /// Entry lifetime; `None` keeps entries for the process lifetime
    pub ttl: Option<Duration>,
    /// Deadline for one catalog request
    pub timeout: Duration,
}

impl Default for PriceCacheConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct PriceCache {
    catalog: Arc<dyn PricingApi>,
    config: PriceCacheConfig,
    entries: DashMap<PriceKey, Arc<OnceCell<PriceEntry>>>,
    metrics: ReconcilerMetrics,
}

impl PriceCache {
    pub fn new(catalog: Arc<dyn PricingApi>, config: PriceCacheConfig) -> Self {
        Self {
            catalog,
            config,
            entries: DashMap::new(),
            metrics: ReconcilerMetrics::new(),
        }
    }

    /// Hourly on-demand price for a machine type in a location.
    ///
    /// A catalog with no matching SKU yields the unknown sentinel (0.0), which
    /// is cached like any other answer. Collaborator failures are returned and
    /// leave the entry empty so the next caller retries.
    pub async fn get_price(&self, machine_type: &str, location: &str) -> Result<Price, ReconcileError> {
        let key = PriceKey::new(machine_type, location);
        let cell = self.slot(&key);

        if let Some(entry) = cell.get() {
            self.metrics.inc_price_cache_hits();
            return Ok(entry.price);
        }

        self.metrics.inc_price_cache_misses();
        let entry = cell.get_or_try_init(|| self.fetch(&key)).await?;
        Ok(entry.price)
    }

    /// Cached entry for a key, if populated and not expired
    pub fn cached(&self, machine_type: &str, location: &str) -> Option<PriceEntry> {
        let key = PriceKey::new(machine_type, location);
        let cell = self.entries.get(&key)?;
        let entry = *cell.value().get()?;
        (!self.is_expired(&entry)).then_some(entry)
    }

    /// Number of populated entries
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get or install the cell for a key, replacing it if its entry expired
    fn slot(&self, key: &PriceKey) -> Arc<OnceCell<PriceEntry>> {
        let mut slot = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()));

        let expired = slot
            .value()
            .get()
            .map(|entry| self.is_expired(entry))
            .unwrap_or(false);
        if expired {
            debug!(machine_type = %key.machine_type, location = %key.location, "Price entry expired");
            *slot.value_mut() = Arc::new(OnceCell::new());
        }

        Arc::clone(slot.value())
    }

    fn is_expired(&self, entry: &PriceEntry) -> bool {
        match self.config.ttl {
            None => false,
            Some(ttl) => {
                let age = (Utc::now() - entry.fetched_at).to_std().unwrap_or_default();
                age >= ttl
            }
        }
    }

    async fn fetch(&self, key: &PriceKey) -> Result<PriceEntry, ReconcileError> {
        self.metrics.inc_pricing_calls();
        debug!(machine_type = %key.machine_type, location = %key.location, "Querying pricing catalog");

        let skus = bounded(
            "pricing",
            self.config.timeout,
            self.catalog
                .lookup(&key.machine_type, &key.location, PricingTerm::OnDemand),
        )
        .await?;

        let price = match select_rate(&skus, key) {
            Ok(rate) => Price::known(rate),
            Err(e) => {
                warn!(error = %e, "Pricing catalog has no match, using 0.0");
                Price::unknown()
            }
        };

        Ok(PriceEntry {
            price,
            fetched_at: Utc::now(),
        })
    }
}

/// Pick the hourly rate of the first USD SKU in catalog order.
///
/// Catalogs usually return a single dominant SKU per machine type and
/// location; when several match, the first one seen wins.
pub fn select_rate(skus: &[PricedSku], key: &PriceKey) -> Result<f64, ReconcileError> {
    skus.iter()
        .find(|sku| sku.currency == CURRENCY)
        .map(|sku| sku.price_per_hour)
        .ok_or_else(|| ReconcileError::PriceUnavailable {
            machine_type: key.machine_type.clone(),
            location: key.location.clone(),
        })
}
