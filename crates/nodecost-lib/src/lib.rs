//! Core library for node cost and utilization reconciliation
//!
//! This crate provides the core functionality for:
//! - Normalizing Kubernetes quantity strings into canonical units
//! - Resolving cluster nodes to billed cloud instances
//! - Pricing instances through a memoizing price cache
//! - Computing per-node and cluster-wide utilization
//! - Driving reconciliation cycles on a fixed interval
//! - Health checks and observability

pub mod api;
pub mod collaborators;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pricing;
pub mod quantity;
pub mod reconciler;
pub mod resolver;
pub mod utilization;

#[cfg(test)]
mod testing;

pub use error::{ReconcileError, UnitError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ReconcilerMetrics, StructuredLogger};
pub use reconciler::{
    CycleReport, Reconciler, ReconcilerConfig, RefreshLoop, RefreshLoopBuilder,
};
