//! HTTP API tests
//!
//! Requests go straight into the router with `tower::ServiceExt::oneshot`;
//! no socket is bound.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower::ServiceExt;

use common::{registry_with, ScriptedSource, CONFERENCE};
use trackrelay::server::api::{create_router, EXPIRES_IN_PAST};
use trackrelay::server::AppState;
use trackrelay::site::SiteRegistry;

fn app(registry: &Arc<SiteRegistry>) -> Router {
    create_router(AppState::new(Arc::clone(registry)))
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

async fn get(app: Router, uri: &str) -> Value {
    get_with_host(app, uri, None).await
}

async fn get_with_host(app: Router, uri: &str, host: Option<&str>) -> Value {
    let mut request = Request::builder().uri(uri);
    if let Some(host) = host {
        request = request.header(header::HOST, host);
    }

    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn update_uri(status: &str, sequencer: f64) -> String {
    format!(
        "/update?conference={}&tracker_status={}&tracker_status_at={sequencer}",
        encode(CONFERENCE),
        encode(status)
    )
}

// ============================================================================
// Request validation
// ============================================================================

#[tokio::test]
async fn test_poll_missing_conference() {
    let registry = registry_with(&ScriptedSource::new());

    let body = get(app(&registry), "/poll").await;

    assert_eq!(body, json!({"ok": false, "error": "missing conference"}));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_poll_bad_conference() {
    let registry = registry_with(&ScriptedSource::new());

    let body = get(app(&registry), "/poll?conference=conf%2F2024").await;

    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "bad conference \"conf/2024\"");
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_update_without_status() {
    let registry = registry_with(&ScriptedSource::new());

    let uri = format!("/update?conference={}&tracker_status_at=5", encode(CONFERENCE));
    let body = get(app(&registry), &uri).await;

    assert_eq!(body, json!({"ok": false, "error": "bad status update"}));
}

// ============================================================================
// Poll and update
// ============================================================================

#[tokio::test]
async fn test_update_then_poll() {
    let source = ScriptedSource::new();
    let registry = registry_with(&source);

    let body = get(app(&registry), &update_uri("session 3 live", 5.0)).await;
    assert_eq!(body, json!({"ok": true}));

    let uri = format!("/poll?conference={}", encode(CONFERENCE));
    let body = get(app(&registry), &uri).await;

    assert_eq!(
        body,
        json!({"ok": true, "tracker_status": "session 3 live", "tracker_status_at": 5.0})
    );
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_root_is_poll_alias() {
    let registry = registry_with(&ScriptedSource::new());
    get(app(&registry), &update_uri("s1", 1.0)).await;

    let uri = format!("/?conference={}", encode(CONFERENCE));
    let body = get(app(&registry), &uri).await;

    assert_eq!(body["tracker_status"], "s1");
}

#[tokio::test]
async fn test_poll_reports_fetch_error() {
    let source = ScriptedSource::new();
    source.push_err("connection refused");
    let registry = registry_with(&source);

    let uri = format!("/poll?conference={}", encode(CONFERENCE));
    let body = get(app(&registry), &uri).await;

    assert_eq!(body, json!({"ok": false, "error": "connection refused"}));
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_conference_host_from_request() {
    let registry = registry_with(&ScriptedSource::new());

    let uri = format!("/update?conference={}&tracker_status=s1&tracker_status_at=1", encode("http://"));
    let body = get_with_host(app(&registry), &uri, Some("Relay.example.org")).await;

    assert_eq!(body["ok"], true);
    assert_eq!(registry.urls(), vec!["http://relay.example.org/".to_string()]);
}

#[tokio::test]
async fn test_conference_host_from_request_keeps_path() {
    let registry = registry_with(&ScriptedSource::new());

    let uri = format!(
        "/update?conference={}&tracker_status=s1&tracker_status_at=1",
        encode("http:///conf/2024")
    );
    let body = get_with_host(app(&registry), &uri, Some("relay.example.org")).await;

    assert_eq!(body["ok"], true);
    assert_eq!(
        registry.urls(),
        vec!["http://relay.example.org/conf/2024/".to_string()]
    );
}

#[tokio::test]
async fn test_repeated_parameters_use_first_value() {
    let registry = registry_with(&ScriptedSource::new());

    let uri = format!(
        "/update?conference={}&tracker_status=s1&tracker_status=s2&tracker_status_at=3&tracker_status_at=9",
        encode(CONFERENCE)
    );
    let response = app(&registry)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::EXPIRES], EXPIRES_IN_PAST);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let uri = format!("/poll?conference={}&conference=https%3A%2F%2Fother.example.org%2F", encode(CONFERENCE));
    let body = get(app(&registry), &uri).await;
    assert_eq!(body, json!({"ok": true, "tracker_status": "s1", "tracker_status_at": 3.0}));
    assert_eq!(registry.len(), 1);
}

// ============================================================================
// Long polls
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_long_poll_times_out_with_current_status() {
    let registry = registry_with(&ScriptedSource::new());
    get(app(&registry), &update_uri("s1", 1.0)).await;

    let start = Instant::now();
    let uri = format!(
        "/poll?conference={}&poll=s1&tracker_status_at=1&timeout=100",
        encode(CONFERENCE)
    );
    let body = get(app(&registry), &uri).await;

    assert_eq!(body, json!({"ok": true, "tracker_status": "s1", "tracker_status_at": 1.0}));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_long_poll_returns_differing_status_immediately() {
    let registry = registry_with(&ScriptedSource::new());
    get(app(&registry), &update_uri("s2", 2.0)).await;

    let start = Instant::now();
    let uri = format!(
        "/poll?conference={}&poll=s1&tracker_status_at=1&timeout=5000",
        encode(CONFERENCE)
    );
    let body = get(app(&registry), &uri).await;

    assert_eq!(body["tracker_status"], "s2");
    assert!(start.elapsed() < Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn test_long_poll_woken_by_update() {
    let registry = registry_with(&ScriptedSource::new());
    get(app(&registry), &update_uri("s1", 1.0)).await;

    let uri = format!(
        "/poll?conference={}&poll=s1&tracker_status_at=1&timeout=5000",
        encode(CONFERENCE)
    );
    let router = app(&registry);
    let poll = tokio::spawn(async move { get(router, &uri).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    get(app(&registry), &update_uri("s2", 2.0)).await;

    let body = poll.await.unwrap();
    assert_eq!(body, json!({"ok": true, "tracker_status": "s2", "tracker_status_at": 2.0}));
}

// ============================================================================
// Headers and health
// ============================================================================

#[tokio::test]
async fn test_responses_defeat_caching() {
    let registry = registry_with(&ScriptedSource::new());

    let response = app(&registry)
        .oneshot(Request::builder().uri("/poll").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers[header::EXPIRES], EXPIRES_IN_PAST);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn test_health_counts_sites() {
    let registry = registry_with(&ScriptedSource::new());
    get(app(&registry), &update_uri("s1", 1.0)).await;

    let body = get(app(&registry), "/health").await;

    assert_eq!(body["ok"], true);
    assert_eq!(body["sites"], 1);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
