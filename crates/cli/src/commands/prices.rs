//! One-shot price lookups

use anyhow::{Context, Result};
use colored::Colorize;
use nodecost_lib::pricing::{PriceCache, PriceCacheConfig};
use serde::Serialize;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

use crate::cloud::CloudGateway;
use crate::config::Settings;
use crate::output::{format_currency, print_json, OutputFormat};

#[derive(Debug, Serialize)]
struct PriceResult {
    machine_type: String,
    location: String,
    /// `None` when the catalog has no matching SKU
    usd_per_hour: Option<f64>,
}

/// Row for the price table
#[derive(Tabled)]
struct PriceRow {
    #[tabled(rename = "Type")]
    machine_type: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "$/hour")]
    price: String,
}

impl From<&PriceResult> for PriceRow {
    fn from(result: &PriceResult) -> Self {
        PriceRow {
            machine_type: result.machine_type.clone(),
            location: result.location.clone(),
            price: match result.usd_per_hour {
                Some(usd) => format_currency(usd, "USD"),
                None => "unknown".yellow().to_string(),
            },
        }
    }
}

/// Look up on-demand prices for machine types in the configured location
pub async fn show_prices(
    settings: &Settings,
    machine_types: &[String],
    format: OutputFormat,
) -> Result<()> {
    let gateway = Arc::new(CloudGateway::new(&settings.gateway_url, settings.timeout())?);
    let location = settings.pricing_location()?;
    let cache = PriceCache::new(
        gateway,
        PriceCacheConfig {
            ttl: None,
            timeout: settings.timeout(),
        },
    );

    let mut results = Vec::with_capacity(machine_types.len());
    for machine_type in machine_types {
        let price = cache
            .get_price(machine_type, &location)
            .await
            .with_context(|| format!("Failed to price {machine_type}"))?;

        results.push(PriceResult {
            machine_type: machine_type.clone(),
            location: location.clone(),
            usd_per_hour: price.known.then_some(price.usd_per_hour),
        });
    }

    match format {
        OutputFormat::Json => print_json(&results)?,
        OutputFormat::Table => {
            let rows: Vec<PriceRow> = results.iter().map(PriceRow::from).collect();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
    }

    Ok(())
}
