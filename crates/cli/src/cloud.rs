//! Cloud gateway client
//!
//! The gateway fronts the cloud provider's inventory and pricing services
//! over plain HTTP and answers with the provider's own document shapes:
//! `DescribeInstances` for `/ec2/instances` and `GetProducts` for
//! `/pricing/products`. Documents are decoded into typed structs here and
//! anything malformed is rejected before it reaches the reconciler.

use anyhow::{Context, Result};
use async_trait::async_trait;
use nodecost_lib::collaborators::{
    InstanceQuery, InventoryApi, PricedSku, PricingApi, PricingTerm,
};
use nodecost_lib::InstanceFragment;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed {document} document: {source}")]
    Malformed {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// HTTP client for the cloud gateway
pub struct CloudGateway {
    client: Client,
    base_url: Url,
}

impl CloudGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        // Keep any path prefix when joining endpoint paths
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("Invalid gateway URL")?;

        Ok(Self { client, base_url })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        document: &'static str,
    ) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, body }.into());
        }

        let bytes = response.bytes().await.context("Failed to read response")?;
        serde_json::from_slice(&bytes)
            .map_err(|source| GatewayError::Malformed { document, source }.into())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    instance_type: String,
    #[serde(default)]
    instance_lifecycle: Option<String>,
    #[serde(default)]
    private_ip_address: Option<String>,
}

impl From<Instance> for InstanceFragment {
    fn from(instance: Instance) -> Self {
        InstanceFragment {
            instance_id: instance.instance_id,
            machine_type: instance.instance_type,
            lifecycle: instance.instance_lifecycle,
            private_ip: instance.private_ip_address,
        }
    }
}

#[async_trait]
impl InventoryApi for CloudGateway {
    async fn describe_instances(&self, query: &InstanceQuery) -> Result<Vec<InstanceFragment>> {
        let (param, values) = match query {
            InstanceQuery::Ids(ids) => ("instance-id", ids),
            InstanceQuery::PrivateIps(ips) => ("private-ip-address", ips),
        };
        let params: Vec<(&str, &str)> = values.iter().map(|v| (param, v.as_str())).collect();

        let output: DescribeInstancesOutput =
            self.get("ec2/instances", &params, "DescribeInstances").await?;

        let fragments: Vec<InstanceFragment> = output
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .map(InstanceFragment::from)
            .collect();

        debug!(param = param, requested = values.len(), found = fragments.len(), "Described instances");
        Ok(fragments)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetProductsOutput {
    /// Each entry is itself a JSON document
    price_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PriceListItem {
    product: Product,
    /// Term type -> offer term code -> offer
    #[serde(default)]
    terms: BTreeMap<String, BTreeMap<String, Offer>>,
}

#[derive(Debug, Deserialize)]
struct Product {
    sku: String,
}

#[derive(Debug, Deserialize)]
struct Offer {
    #[serde(rename = "priceDimensions")]
    price_dimensions: BTreeMap<String, PriceDimension>,
}

#[derive(Debug, Deserialize)]
struct PriceDimension {
    #[serde(rename = "pricePerUnit")]
    price_per_unit: BTreeMap<String, String>,
}

/// Flatten one price list entry into SKUs for the given term
fn skus_from_item(item: PriceListItem, term: PricingTerm) -> Result<Vec<PricedSku>> {
    let mut skus = Vec::new();
    let Some(offers) = item.terms.get(term.as_str()) else {
        return Ok(skus);
    };

    for offer in offers.values() {
        for dimension in offer.price_dimensions.values() {
            for (currency, amount) in &dimension.price_per_unit {
                let price_per_hour = amount.parse::<f64>().with_context(|| {
                    format!("Invalid price '{}' for SKU {}", amount, item.product.sku)
                })?;
                skus.push(PricedSku {
                    sku: item.product.sku.clone(),
                    price_per_hour,
                    currency: currency.clone(),
                });
            }
        }
    }

    Ok(skus)
}

#[async_trait]
impl PricingApi for CloudGateway {
    async fn lookup(
        &self,
        machine_type: &str,
        location: &str,
        term: PricingTerm,
    ) -> Result<Vec<PricedSku>> {
        let params = [
            ("serviceCode", "AmazonEC2"),
            ("instanceType", machine_type),
            ("location", location),
            ("termType", term.as_str()),
        ];
        let output: GetProductsOutput =
            self.get("pricing/products", &params, "GetProducts").await?;

        let mut skus = Vec::new();
        for entry in &output.price_list {
            let item: PriceListItem = serde_json::from_str(entry).map_err(|source| {
                GatewayError::Malformed {
                    document: "PriceList entry",
                    source,
                }
            })?;
            skus.extend(skus_from_item(item, term)?);
        }

        debug!(machine_type = %machine_type, location = %location, skus = skus.len(), "Looked up prices");
        Ok(skus)
    }
}
