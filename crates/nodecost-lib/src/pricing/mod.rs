//! Instance pricing
//!
//! This module provides:
//! - A memoizing price cache with single-flight misses and optional TTL
//! - Mapping from region codes to pricing catalog location descriptors

mod cache;
mod location;

pub use cache::{select_rate, PriceCache, PriceCacheConfig, PriceEntry, PriceKey};
pub use location::location_for_region;
