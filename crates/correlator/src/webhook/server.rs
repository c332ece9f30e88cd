//! HTTP server for alert webhooks and metrics.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::NormalizeError;
use crate::metrics::{self, CorrelatorMetrics};
use crate::session::SessionWindow;

use super::normalize::normalize;

/// Server state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The active-session window alerts are ingested into
    pub window: Arc<SessionWindow>,
    /// Metrics exposed on `/metrics`
    pub metrics: CorrelatorMetrics,
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/alert", post(alert_handler))
        .route("/api/alerts", post(alert_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/api/session", get(session_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and serve until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails to bind or serve.
pub async fn run_server(state: AppState, addr: &str, shutdown: CancellationToken) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Alert correlator listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

// ============================================================================
// Request/Response types
// ============================================================================

/// Response to an alert delivery.
#[derive(Debug, Serialize)]
struct AlertResponse {
    status: &'static str,
    alerts_accepted: usize,
}

/// Response for a rejected delivery.
#[derive(Debug, Serialize)]
struct RejectedResponse {
    status: &'static str,
    error: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Active session view.
#[derive(Debug, Serialize)]
struct SessionResponse {
    active: bool,
    alert_count: usize,
    age_seconds: Option<f64>,
    inactivity_seconds: Option<f64>,
    opened_at: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Alert webhook handler. Accepts Alertmanager, labeled and flat payloads.
///
/// The body is parsed here rather than by the `Json` extractor so that
/// syntax errors get the same rejection body as structural ones.
async fn alert_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let records = match serde_json::from_slice::<serde_json::Value>(&body)
        .map_err(NormalizeError::from)
        .and_then(normalize)
    {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "Rejected malformed alert payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(RejectedResponse {
                    status: "rejected",
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    let alerts_accepted = records.len();
    for record in records {
        state.window.ingest(record).await;
    }

    (
        StatusCode::OK,
        Json(AlertResponse {
            status: "alert received",
            alerts_accepted,
        }),
    )
        .into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, metrics::CONTENT_TYPE)],
        state.metrics.encode(),
    )
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = match state.window.snapshot().await {
        Some(snapshot) => SessionResponse {
            active: true,
            alert_count: snapshot.alert_count,
            age_seconds: Some(snapshot.age.as_secs_f64()),
            inactivity_seconds: Some(snapshot.inactivity.as_secs_f64()),
            opened_at: Some(snapshot.opened_at.to_rfc3339()),
        },
        None => SessionResponse {
            active: false,
            alert_count: 0,
            age_seconds: None,
            inactivity_seconds: None,
            opened_at: None,
        },
    };
    Json(response)
}
