//! Error taxonomy for reconciliation
//!
//! Errors local to one node (`Unit`, `NotFound`, `PriceUnavailable`) never
//! abort a cycle. Collaborator errors raised by a cycle-wide bulk fetch abort
//! only that cycle.

use std::time::Duration;
use thiserror::Error;

use crate::models::ResourceKind;

/// A quantity string that could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable {kind} quantity {raw:?}: {reason}")]
pub struct UnitError {
    pub kind: ResourceKind,
    pub raw: String,
    pub reason: String,
}

impl UnitError {
    pub(crate) fn new(kind: ResourceKind, raw: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error("node {node} could not be matched to a cloud instance")]
    NotFound { node: String },

    #[error("no on-demand price for {machine_type} in {location}")]
    PriceUnavailable {
        machine_type: String,
        location: String,
    },

    #[error("{collaborator} did not answer within {timeout:?}")]
    CollaboratorTimeout {
        collaborator: &'static str,
        timeout: Duration,
    },

    #[error("{collaborator} unavailable: {source}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ReconcileError {
    /// Whether this error invalidates the whole cycle rather than one node
    pub fn is_cycle_wide(&self) -> bool {
        matches!(
            self,
            ReconcileError::CollaboratorTimeout { .. }
                | ReconcileError::CollaboratorUnavailable { .. }
        )
    }
}

/// Run a collaborator call under a deadline, folding both failure modes
/// into the reconciliation taxonomy.
pub(crate) async fn bounded<T, F>(
    collaborator: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, ReconcileError>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(ReconcileError::CollaboratorUnavailable {
            collaborator,
            source,
        }),
        Err(_) => Err(ReconcileError::CollaboratorTimeout {
            collaborator,
            timeout,
        }),
    }
}
