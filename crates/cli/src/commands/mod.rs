//! CLI command implementations

pub mod once;
pub mod prices;
pub mod watch;

use crate::cloud::CloudGateway;
use crate::cluster::KubeCluster;
use crate::config::Settings;
use anyhow::Result;
use nodecost_lib::{Reconciler, StructuredLogger};
use std::path::Path;
use std::sync::Arc;

/// Wire the reconciler to the cluster and the cloud gateway
pub async fn build_reconciler(settings: &Settings, kubeconfig: Option<&Path>) -> Result<Reconciler> {
    let context = settings.kube_context.as_deref();
    let cluster = KubeCluster::connect(kubeconfig, context).await?;
    let gateway = Arc::new(CloudGateway::new(&settings.gateway_url, settings.timeout())?);

    let logger = StructuredLogger::new(context.unwrap_or("current-context"));
    let reconciler = Reconciler::new(
        Arc::new(cluster),
        gateway.clone(),
        gateway,
        settings.reconciler_config()?,
    )
    .with_logger(logger);

    Ok(reconciler)
}
