//! Integration tests for the HTTP API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use nodecost_lib::{
    api::{create_router, AppState},
    health::{components, HealthRegistry},
    BillingLifecycle, ClusterSummary, ConsumptionMode, InstanceRecord, NodeIdentity,
    NodeResources, NodeSnapshot, Price, ReconcilerMetrics, Utilization,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = ReconcilerMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics));
    let router = create_router(state.clone());

    (router, state)
}

fn sample_summary() -> ClusterSummary {
    let node = NodeSnapshot {
        identity: NodeIdentity {
            name: "node-a".to_string(),
            ..Default::default()
        },
        instance: Some(InstanceRecord {
            instance_id: "i-0abc".to_string(),
            machine_type: "m5.xlarge".to_string(),
            lifecycle: BillingLifecycle::OnDemand,
            price: Price::known(0.214),
        }),
        capacity: NodeResources::new(4.0, 16.0),
        allocatable: NodeResources::new(3.92, 15.0),
        consumed: NodeResources::new(1.0, 4.0),
        utilization: Utilization {
            cpu_pct: 25.0,
            memory_pct: 25.0,
        },
    };
    ClusterSummary::aggregate(ConsumptionMode::Requests, vec![node])
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["pricing"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::INVENTORY, "1 node(s) unresolved")
        .await;

    let (status, body) = get(app, "/healthz").await;

    // Degraded still returns 200
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["inventory"]["message"],
        "1 node(s) unresolved"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::CLUSTER_API, "timed out after 10s")
        .await;

    let (status, body) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_before_first_cycle() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_after_summary() {
    let (app, state) = setup_test_app().await;

    state.health_registry.observe_summary(&sample_summary()).await;

    let (status, body) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::CLUSTER_API, "connection refused")
        .await;

    let (status, _) = get(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_summary_returns_404_before_first_cycle() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/summary").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].is_string());
}

#[tokio::test]
async fn test_summary_returns_latest_published() {
    let (app, state) = setup_test_app().await;

    state.publish(Arc::new(sample_summary())).await;

    let (status, body) = get(app, "/api/v1/summary").await;

    assert_eq!(status, StatusCode::OK);
    let summary: ClusterSummary = serde_json::from_slice(&body).unwrap();
    assert_eq!(summary.mode, ConsumptionMode::Requests);
    assert_eq!(summary.node_count, 1);
    assert!((summary.total_cost_per_hour - 0.214).abs() < 1e-9);
    assert_eq!(summary.nodes[0].name(), "node-a");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state
        .metrics
        .record_cycle(&sample_summary(), Duration::from_millis(250));
    state.metrics.inc_price_cache_hits();
    state.metrics.inc_pricing_calls();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("nodecost_cycle_duration_seconds_bucket"));
    assert!(metrics_text.contains("nodecost_cluster_cost_usd_per_hour"));
    assert!(metrics_text.contains("nodecost_average_utilization_percent"));
    assert!(metrics_text.contains("nodecost_price_cache_hits_total"));
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (app, _state) = setup_test_app().await;

    let (status, _) = get(app, "/nonexistent").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
