//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::artifacts::StoreStats;
use crate::engine::EngineHealth;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    pub engines: Vec<EngineHealth>,
    pub supported_tools: Vec<&'static str>,
    pub store: StoreStats,
}

/// `healthy` when every engine is available, `degraded` otherwise
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let engines = state.registry().health().await;
    let status = if engines.iter().all(|engine| engine.available) {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        service: "doc-converter-server",
        engines,
        supported_tools: state.registry().tools().iter().map(|tool| tool.id).collect(),
        store: state.store().stats(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}
