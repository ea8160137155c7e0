//! Cycle and refresh loop tests against mock collaborators

use super::*;
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::{BillingLifecycle, ContainerResources, NodeResources, PodResources, RawResources};
use crate::testing::{fragment, node, pod, usage, MockCluster, MockInventory, MockPricing};
use std::sync::atomic::Ordering;
use tokio::sync::broadcast;

fn config(mode: ConsumptionMode) -> ReconcilerConfig {
    ReconcilerConfig {
        mode,
        timeout: Duration::from_secs(1),
        ..Default::default()
    }
}

/// Three nodes, the third without any identity the inventory knows
fn three_node_cluster() -> MockCluster {
    MockCluster {
        nodes: vec![
            node("node-a", Some("i-a"), Some("10.0.0.1")),
            node("node-b", None, Some("10.0.0.2")),
            node("node-c", None, Some("10.0.0.99")),
        ],
        pods: vec![
            pod("web", "node-a", "1", "4Gi"),
            pod("db", "node-b", "2", "8Gi"),
            pod("batch", "node-c", "4", "16Gi"),
        ],
        usage: vec![
            usage("web", "500m", "2Gi"),
            usage("db", "1", "4Gi"),
            usage("batch", "4", "16Gi"),
        ],
        ..Default::default()
    }
}

fn inventory() -> MockInventory {
    MockInventory {
        instances: vec![
            fragment("i-a", "m5.xlarge", "10.0.0.1", None),
            fragment("i-b", "m5.xlarge", "10.0.0.2", Some("spot")),
        ],
        ..Default::default()
    }
}

fn reconciler(
    cluster: Arc<MockCluster>,
    inventory: Arc<MockInventory>,
    pricing: Arc<MockPricing>,
    mode: ConsumptionMode,
) -> Reconciler {
    Reconciler::new(cluster, inventory, pricing, config(mode))
}

#[tokio::test]
async fn test_quarter_utilization_scenario() {
    let cluster = Arc::new(MockCluster {
        nodes: vec![node("node-a", Some("i-a"), None)],
        pods: vec![pod("web", "node-a", "1", "4Gi")],
        ..Default::default()
    });
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    let r = reconciler(cluster, Arc::new(inventory()), pricing, ConsumptionMode::Requests);

    let summary = r.run_cycle().await.unwrap();

    let snapshot = &summary.nodes[0];
    assert_eq!(snapshot.utilization.cpu_pct, 25.0);
    assert_eq!(snapshot.utilization.memory_pct, 25.0);
    assert_eq!(snapshot.capacity, NodeResources::new(4.0, 16.0));
    assert_eq!(snapshot.allocatable.cpu_cores(), 3.92);
}

#[tokio::test]
async fn test_unresolved_node_excluded_from_totals() {
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    let r = reconciler(
        Arc::new(three_node_cluster()),
        Arc::new(inventory()),
        pricing,
        ConsumptionMode::Requests,
    );

    let summary = r.run_cycle().await.unwrap();

    assert_eq!(summary.nodes.len(), 3);
    assert_eq!(summary.node_count, 2);
    assert_eq!(summary.failed_count, 1);
    assert!(!summary.nodes[2].is_resolved());
    assert_eq!(summary.nodes[2].name(), "node-c");

    // node-a 25%/25%, node-b 50%/50%; node-c's 100% must not count
    assert!((summary.average_utilization.cpu_pct - 37.5).abs() < 1e-9);
    assert!((summary.average_utilization.memory_pct - 37.5).abs() < 1e-9);
    assert!((summary.total_cost_per_hour - 0.428).abs() < 1e-9);
    assert_eq!(summary.total_capacity, NodeResources::new(8.0, 32.0));
}

#[tokio::test]
async fn test_lifecycle_carried_to_snapshot() {
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    let r = reconciler(
        Arc::new(three_node_cluster()),
        Arc::new(inventory()),
        pricing,
        ConsumptionMode::Requests,
    );

    let summary = r.run_cycle().await.unwrap();

    let a = summary.nodes[0].instance.as_ref().unwrap();
    let b = summary.nodes[1].instance.as_ref().unwrap();
    assert_eq!(a.lifecycle, BillingLifecycle::OnDemand);
    assert_eq!(b.lifecycle, BillingLifecycle::Spot);
    assert_eq!(b.instance_id, "i-b");
}

#[tokio::test]
async fn test_unpriced_machine_type_still_completes() {
    let cluster = Arc::new(MockCluster {
        nodes: vec![node("node-x", Some("i-x"), None)],
        ..Default::default()
    });
    let inventory = Arc::new(MockInventory {
        instances: vec![fragment("i-x", "x9.mega", "10.0.0.5", None)],
        ..Default::default()
    });
    let r = reconciler(
        cluster,
        inventory,
        Arc::new(MockPricing::default()),
        ConsumptionMode::Requests,
    );

    let summary = r.run_cycle().await.unwrap();

    assert_eq!(summary.node_count, 1);
    assert_eq!(summary.unpriced_count, 1);
    let instance = summary.nodes[0].instance.as_ref().unwrap();
    assert_eq!(instance.machine_type, "x9.mega");
    assert_eq!(instance.price.usd_per_hour, 0.0);
    assert_eq!(summary.total_cost_per_hour, 0.0);
}

#[tokio::test]
async fn test_pricing_outage_prices_nodes_at_zero() {
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    pricing.fail.store(true, Ordering::SeqCst);
    let r = reconciler(
        Arc::new(three_node_cluster()),
        Arc::new(inventory()),
        pricing,
        ConsumptionMode::Requests,
    );

    let summary = r.run_cycle().await.unwrap();

    assert_eq!(summary.node_count, 2);
    assert_eq!(summary.unpriced_count, 2);
    assert_eq!(summary.total_cost_per_hour, 0.0);
}

#[tokio::test]
async fn test_consecutive_cycles_are_identical() {
    let cluster = Arc::new(three_node_cluster());
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    let r = reconciler(
        cluster,
        Arc::new(inventory()),
        pricing.clone(),
        ConsumptionMode::Requests,
    );

    let first = r.run_cycle().await.unwrap();
    let second = r.run_cycle().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(pricing.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bulk_fetches_are_independent_of_node_count() {
    let cluster = Arc::new(three_node_cluster());
    let inventory = Arc::new(inventory());
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    let r = reconciler(
        cluster.clone(),
        inventory.clone(),
        pricing.clone(),
        ConsumptionMode::Requests,
    );

    r.run_cycle().await.unwrap();

    assert_eq!(cluster.node_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.pod_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.usage_calls.load(Ordering::SeqCst), 0);
    assert!(inventory.calls.load(Ordering::SeqCst) <= 2);
    // Two nodes share a machine type: one catalog call
    assert_eq!(pricing.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_usage_mode_reads_live_samples() {
    let cluster = Arc::new(three_node_cluster());
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    let r = reconciler(
        cluster.clone(),
        Arc::new(inventory()),
        pricing,
        ConsumptionMode::Usage,
    );

    let summary = r.run_cycle().await.unwrap();

    assert_eq!(summary.mode, ConsumptionMode::Usage);
    assert_eq!(cluster.usage_calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.nodes[0].consumed, NodeResources::new(0.5, 2.0));
    assert_eq!(summary.nodes[0].utilization.cpu_pct, 12.5);
}

#[tokio::test]
async fn test_malformed_pod_quantity_does_not_abort_node() {
    let mut cluster = three_node_cluster();
    cluster.pods.push(PodResources {
        containers: vec![ContainerResources {
            name: "broken".to_string(),
            requests: RawResources {
                cpu: Some("a lot".to_string()),
                memory: Some("1Gi".to_string()),
            },
            limits: RawResources::default(),
        }],
        ..pod("broken", "node-a", "0", "0")
    });
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    let r = reconciler(
        Arc::new(cluster),
        Arc::new(inventory()),
        pricing,
        ConsumptionMode::Requests,
    );

    let summary = r.run_cycle().await.unwrap();

    assert_eq!(summary.nodes[0].consumed, NodeResources::new(1.0, 5.0));
}

#[tokio::test]
async fn test_node_list_failure_aborts_cycle() {
    let cluster = Arc::new(three_node_cluster());
    cluster.fail_nodes.store(true, Ordering::SeqCst);
    let r = reconciler(
        cluster,
        Arc::new(inventory()),
        Arc::new(MockPricing::default()),
        ConsumptionMode::Requests,
    );

    let err = r.run_cycle().await.unwrap_err();
    assert!(err.is_cycle_wide());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cycle_runs_on_spawned_task() {
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    let r = Arc::new(reconciler(
        Arc::new(three_node_cluster()),
        Arc::new(inventory()),
        pricing,
        ConsumptionMode::Requests,
    ));

    let task = {
        let r = r.clone();
        tokio::spawn(async move { r.run_cycle().await })
    };
    let summary = task.await.unwrap().unwrap();

    assert_eq!(summary.nodes.len(), 3);
    assert_eq!(summary.node_count, 2);
    assert_eq!(summary.nodes[0].identity.name, "node-a");
    assert_eq!(summary.nodes[2].identity.name, "node-c");
}

#[tokio::test]
async fn test_refresh_loop_publishes_reports() {
    let pricing = Arc::new(MockPricing::default().with_price("m5.xlarge", 0.214));
    let r = Arc::new(reconciler(
        Arc::new(three_node_cluster()),
        Arc::new(inventory()),
        pricing,
        ConsumptionMode::Requests,
    ));
    let health = HealthRegistry::new();
    health.register_all().await;

    let (refresh, mut rx) = RefreshLoopBuilder::new()
        .reconciler(r)
        .health(health.clone())
        .interval(Duration::from_millis(10))
        .build()
        .unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(refresh.run(shutdown_rx));

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert_eq!(first.cycle, 1);
    assert_eq!(second.cycle, 2);
    assert_eq!(first.summary().unwrap(), second.summary().unwrap());
    assert!(health.readiness().await.ready);
    assert_eq!(
        health.health().await.components[components::INVENTORY].status,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_refresh_loop_reports_skipped_cycle() {
    let cluster = Arc::new(three_node_cluster());
    cluster.fail_nodes.store(true, Ordering::SeqCst);
    let r = Arc::new(reconciler(
        cluster,
        Arc::new(inventory()),
        Arc::new(MockPricing::default()),
        ConsumptionMode::Requests,
    ));
    let health = HealthRegistry::new();
    health.register_all().await;

    let (refresh, mut rx) = RefreshLoopBuilder::new()
        .reconciler(r)
        .health(health.clone())
        .interval(Duration::from_millis(10))
        .build()
        .unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(refresh.run(shutdown_rx));

    let report = rx.recv().await.unwrap();
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    assert!(matches!(report.outcome, CycleOutcome::Skipped(_)));
    assert!(report.summary().is_none());
    assert_eq!(health.health().await.status, ComponentStatus::Unhealthy);
    assert!(!health.readiness().await.ready);
}

#[tokio::test]
async fn test_shutdown_mid_cycle_publishes_nothing() {
    let inventory = Arc::new(MockInventory {
        delay: Some(Duration::from_millis(500)),
        ..inventory()
    });
    let r = Arc::new(Reconciler::new(
        Arc::new(three_node_cluster()),
        inventory,
        Arc::new(MockPricing::default()),
        ReconcilerConfig {
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
    ));

    let (refresh, mut rx) = RefreshLoopBuilder::new()
        .reconciler(r)
        .interval(Duration::from_millis(10))
        .build()
        .unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(refresh.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    // Loop dropped its sender without publishing the partial cycle
    assert!(rx.recv().await.is_none());
}

#[test]
fn test_builder_requires_reconciler() {
    assert!(RefreshLoopBuilder::new().build().is_err());
}

#[test]
fn test_cycle_phase_display() {
    assert_eq!(CyclePhase::Collecting.to_string(), "collecting");
    assert_eq!(CyclePhase::Done.to_string(), "done");
}
