//! HTTP API for health checks and Prometheus metrics

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Outcome of the most recent sweep, surfaced through `/healthz`.
#[derive(Debug, Clone, Serialize)]
pub struct SweepStatus {
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    pub message: String,
}

/// Shared application state
#[derive(Clone, Default)]
pub struct AppState {
    last_sweep: Arc<RwLock<Option<SweepStatus>>>,
}

impl AppState {
    pub async fn record_success(&self, message: impl Into<String>) {
        let mut last = self.last_sweep.write().await;
        *last = Some(SweepStatus {
            completed_at: Utc::now(),
            success: true,
            message: message.into(),
        });
    }

    pub async fn record_failure(&self, message: impl Into<String>) {
        let mut last = self.last_sweep.write().await;
        *last = Some(SweepStatus {
            completed_at: Utc::now(),
            success: false,
            message: message.into(),
        });
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_sweep: Option<SweepStatus>,
}

/// Health check response - 200 until a sweep fails, 503 after
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let last_sweep = state.last_sweep.read().await.clone();

    let (status_code, status) = match &last_sweep {
        Some(sweep) if !sweep.success => (StatusCode::SERVICE_UNAVAILABLE, "failing"),
        Some(_) => (StatusCode::OK, "ok"),
        None => (StatusCode::OK, "starting"),
    };

    (status_code, Json(HealthResponse { status, last_sweep }))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
