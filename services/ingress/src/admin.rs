//! Admin HTTP endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tracing::info;

use crate::proxy::{ListenerStats, SharedTargetTable, StatsSnapshot};

#[derive(Clone)]
pub struct AdminState {
    pub stats: Arc<ListenerStats>,
    pub targets: SharedTargetTable,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    listener: StatsSnapshot,
    targets: usize,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Serve the admin router until the task is cancelled.
pub async fn serve(addr: SocketAddr, state: AdminState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind admin endpoint on {addr}"))?;
    info!(addr = %addr, "Admin endpoint listening");
    axum::serve(listener, router(state))
        .await
        .context("Admin endpoint failed")
}

async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: "ingress",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn stats(State(state): State<AdminState>) -> impl IntoResponse {
    Json(StatsResponse {
        listener: state.stats.snapshot(),
        targets: state.targets.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::TargetTable;
    use axum::http::StatusCode;
    use std::sync::atomic::Ordering;

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_returns_ok() {
        let response = healthz().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_stats_reports_counters() {
        let state = AdminState {
            stats: Arc::new(ListenerStats::default()),
            targets: Arc::new(TargetTable::new()),
        };
        state.stats.forwarded.fetch_add(3, Ordering::Relaxed);

        let response = stats(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["listener"]["forwarded"], 3);
        assert_eq!(body["targets"], 0);
    }
}
