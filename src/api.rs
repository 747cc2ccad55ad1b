use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tower_http::cors::CorsLayer;

use crate::cursor::{Cursor, SourceKey};
use crate::poller::{CycleSummary, Poller};

const DEFAULT_CYCLES_LIMIT: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub poller: Arc<Poller>,
    /// Required bearer token for trigger and cursor routes; `None` leaves them open.
    pub cron_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(poller: Arc<Poller>, cron_secret: Option<String>) -> Self {
        Self {
            poller,
            cron_secret: cron_secret.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // Other methods get axum's 405.
        .route("/api/poll", get(trigger_poll).post(trigger_poll))
        .route("/api/cursors/{key}", get(get_cursor))
        .route("/debug/cycles", get(debug_cycles))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct TriggerOk {
    ok: bool,
    #[serde(flatten)]
    summary: CycleSummary,
}

async fn trigger_poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers, &q) {
        return resp;
    }

    // Run on its own task so a panic inside the cycle becomes a 500, not a dropped connection.
    let poller = state.poller.clone();
    match tokio::spawn(async move { poller.run_cycle().await }).await {
        Ok(summary) => Json(TriggerOk { ok: true, summary }).into_response(),
        Err(e) => {
            tracing::error!(target: "api", error = %e, "poll cycle task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CursorOut {
    source_key: SourceKey,
    cursor: Option<Cursor>,
}

async fn get_cursor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
    Path(raw): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers, &q) {
        return resp;
    }
    let key: SourceKey = match raw.parse() {
        Ok(k) => k,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        }
    };
    match state.poller.store().get(&key).await {
        Ok(cursor) => Json(CursorOut {
            source_key: key,
            cursor,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(target: "api", source_key = %key, error = ?e, "cursor lookup failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "ok": false, "error": format!("{e:#}") })),
            )
                .into_response()
        }
    }
}

async fn debug_cycles(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<CycleSummary>> {
    let limit = q
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_CYCLES_LIMIT);
    Json(state.poller.history().snapshot_last_n(limit))
}

/// Bearer header or `?token=`; rejected before any cycle work starts.
fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    q: &HashMap<String, String>,
) -> Result<(), Response> {
    let Some(secret) = state.cron_secret.as_deref() else {
        return Ok(());
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .or_else(|| q.get("token").map(String::as_str));

    match presented {
        Some(token) if digest_eq(token, secret) => Ok(()),
        _ => {
            tracing::warn!(target: "api", "rejected trigger with missing or bad token");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "ok": false, "error": "unauthorized" })),
            )
                .into_response())
        }
    }
}

// Compare fixed-size digests so timing does not depend on where the strings differ.
fn digest_eq(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}
