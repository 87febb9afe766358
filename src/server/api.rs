//! HTTP handlers for the relay
//!
//! Every handler answers `200 OK` with a JSON body; failures are reported
//! in-band as `{ok: false, error}`. All responses carry permissive CORS
//! headers and a far-past `Expires` header so that clients and proxies
//! never cache status.

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use url::form_urlencoded;

use crate::models::{Sequencer, SiteResponse, TrackerStatus};

use super::server::AppState;

/// Expires header value that defeats caching
pub const EXPIRES_IN_PAST: &str = "Mon, 26 Jul 1997 05:00:00 GMT";

/// Error reported when an update lacks a status
pub const BAD_STATUS_UPDATE: &str = "bad status update";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for `/poll`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollParams {
    pub conference: Option<String>,
    /// Status the client already knows and wants to wait past
    pub poll: Option<String>,
    pub tracker_status_at: Option<String>,
    /// Long-poll timeout in milliseconds
    pub timeout: Option<String>,
}

/// Query parameters for `/update`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpdateParams {
    pub conference: Option<String>,
    pub tracker_status: Option<String>,
    pub tracker_status_at: Option<String>,
}

impl PollParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut values = query_values(query);
        Self {
            conference: values.remove("conference"),
            poll: values.remove("poll"),
            tracker_status_at: values.remove("tracker_status_at"),
            timeout: values.remove("timeout"),
        }
    }
}

impl UpdateParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut values = query_values(query);
        Self {
            conference: values.remove("conference"),
            tracker_status: values.remove("tracker_status"),
            tracker_status_at: values.remove("tracker_status_at"),
        }
    }
}

/// Decode a query string; the first occurrence of a repeated key wins
fn query_values(query: Option<&str>) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        values
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    values
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: String,
    pub uptime_secs: u64,
    pub sites: usize,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(poll))
        .route("/poll", get(poll))
        .route("/update", get(update))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Wrap a JSON body with the relay's standard headers
pub fn respond<T: Serialize>(body: T) -> Response {
    (
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Accept-Encoding"),
            (header::EXPIRES, EXPIRES_IN_PAST),
        ],
        Json(body),
    )
        .into_response()
}

fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|h| h.to_str().ok())
}

/// Parse a millisecond timeout; anything unusable means "no timeout"
pub fn parse_timeout(value: Option<&str>) -> Option<Duration> {
    let millis = value?.trim().parse::<f64>().ok()?;
    if !(millis > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(millis / 1000.0).ok()
}

// ============================================================================
// Handlers
// ============================================================================

/// Return the site status, optionally waiting until it changes
async fn poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let params = PollParams::from_query(query.as_deref());
    let conference = params.conference.as_deref().unwrap_or_default();

    let status = match state.registry.site(conference, request_host(&headers)) {
        Err(e) => TrackerStatus::failed(e),
        Ok(site) => match params.poll.filter(|p| !p.is_empty()) {
            Some(poll) => {
                let sequencer = Sequencer::parse_lenient(params.tracker_status_at.as_deref())
                    .unwrap_or_default();
                let timeout = parse_timeout(params.timeout.as_deref());
                site.wait_for_change(TrackerStatus::new(poll, sequencer), timeout)
                    .await
            }
            None => site.status().await,
        },
    };

    respond(SiteResponse::from(&status))
}

/// Push a status into a site's cache
async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let params = UpdateParams::from_query(query.as_deref());
    let conference = params.conference.as_deref().unwrap_or_default();

    let response = match state.registry.site(conference, request_host(&headers)) {
        Err(e) => SiteResponse::error(e.to_string()),
        Ok(site) => match params.tracker_status.filter(|s| !s.is_empty()) {
            Some(status) => {
                let sequencer = Sequencer::parse_lenient(params.tracker_status_at.as_deref())
                    .unwrap_or_default();
                tracing::info!(site = %site.url(), status = %status, sequencer = %sequencer, "Status pushed");
                site.update(TrackerStatus::new(status, sequencer));
                SiteResponse::ok()
            }
            None => SiteResponse::error(BAD_STATUS_UPDATE),
        },
    };

    respond(response)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Response {
    respond(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        sites: state.registry.len(),
    })
}

// ============================================================================
// Tests
// ============================================================================
