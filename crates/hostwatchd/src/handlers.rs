//! API handlers.
//!
//! Every response uses the `{success, data, error}` envelope.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hostwatch_monitor::QueryError;
use serde::Deserialize;
use tracing::warn;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct UpParams {
    host: Option<String>,
    path: Option<String>,
}

/// GET /up?host=&path=
///
/// An unreachable host is still a 200; the probe result says why.
pub async fn probe_host(State(state): State<ApiState>, Query(params): Query<UpParams>) -> Response {
    let Some(host) = params.host.filter(|h| !h.trim().is_empty()) else {
        return error_response("missing host parameter", StatusCode::BAD_REQUEST);
    };

    match state.query.query_host(&host, params.path.as_deref()).await {
        Ok(result) => ApiResponse::ok(result).into_response(),
        Err(e @ QueryError::InvalidTarget(_)) => {
            error_response(&e.to_string(), StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            warn!(%host, error = %e, "on-demand query failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /hosts
pub async fn list_hosts(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.query.store().snapshot()).into_response()
}

/// GET /roster
pub async fn list_roster(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.query.store().roster()).into_response()
}

/// Page size when `/events` is called without `limit`.
pub const DEFAULT_EVENTS_LIMIT: usize = 100;
/// Largest page `/events` will return.
pub const MAX_EVENTS_LIMIT: usize = 1_000;

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    /// Return events with a sequence number greater than this.
    since: Option<u64>,
    limit: Option<usize>,
}

/// GET /events?since=&limit=
///
/// Pages through the log in append order; pass the last `seq` seen as
/// `since` to continue.
pub async fn list_events(
    State(state): State<ApiState>,
    Query(params): Query<EventsParams>,
) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_EVENTS_LIMIT)
        .min(MAX_EVENTS_LIMIT);
    match state.events.list_page(params.since, limit) {
        Ok(events) => ApiResponse::ok(events).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}
