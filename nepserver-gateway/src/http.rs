// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! HTTP ingress and exposition
//!
//! | route | method | response |
//! |---|---|---|
//! | ingress path | POST | acknowledgment timestamp, or 400 for short frames |
//! | metrics path | GET | OpenMetrics text |
//! | json path | GET | store snapshot as JSON |
//! | anything else | any | 400 / 405 with a plain-text body |

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use nepserver::{RawFrame, Snapshot, TelemetryStore};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::bridge::NotificationBridge;
use crate::config::HttpConfig;
use crate::error::{GatewayError, Result};
use crate::metrics::{encode_metrics, OPENMETRICS_CONTENT_TYPE};

/// Largest request body accepted on any route
pub const MAX_BODY_SIZE: usize = 4096;

/// Application state shared across handlers.
pub struct AppState {
    pub store: Arc<TelemetryStore>,
    /// `None` when no broker is configured or it was unreachable at startup
    pub bridge: Option<NotificationBridge>,
}

impl AppState {
    pub fn new(store: Arc<TelemetryStore>, bridge: Option<NotificationBridge>) -> Self {
        Self { store, bridge }
    }
}

/// Build the router for the configured routes
pub fn router(state: Arc<AppState>, config: &HttpConfig) -> Router {
    Router::new()
        .route(
            &config.ingress_path,
            post(ingest_handler).fallback(method_not_allowed),
        )
        .route(
            &config.metrics_path,
            get(metrics_handler).fallback(method_not_allowed),
        )
        .route(
            &config.json_path,
            get(json_handler).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` flips; in-flight requests complete
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    config: &HttpConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = router(state, config);
    info!(addr = %listener.local_addr()?, "HTTP ingress listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(GatewayError::Io)?;

    info!("HTTP ingress stopped");
    Ok(())
}

/// Acknowledgment body expected by the firmware: UTC as `YYYYDDMMHHmmss`
pub fn acknowledgment(now: DateTime<Utc>) -> String {
    now.format("%Y%d%m%H%M%S").to_string()
}

/// Ingress handler - decodes a frame and records the reading.
async fn ingest_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let reading = match nepserver::decode(&body) {
        Ok(reading) => reading,
        Err(e) => {
            warn!(len = body.len(), error = %e, "rejected frame");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let now = Utc::now();
    let record = state.store.upsert(reading, RawFrame::new(body.to_vec()), now);
    info!(
        serial_number = %reading.serial_number,
        watt = reading.power_watts,
        "received frame"
    );

    if let Some(bridge) = &state.bridge {
        if let Err(e) = bridge.publish_record(&record) {
            warn!(serial_number = %reading.serial_number, error = %e, "bridge publish failed");
        }
    }

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/html")],
        acknowledgment(now),
    )
        .into_response()
}

/// Metrics handler - returns OpenMetrics text.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.store.snapshot();
    match encode_metrics(&snapshot) {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable\n").into_response()
        }
    }
}

/// JSON handler - returns every device record.
async fn json_handler(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.store.snapshot())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, "NOT FOUND\n")
}

async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "METHOD NOT ALLOWED\n")
}
