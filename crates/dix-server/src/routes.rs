//! HTTP routes for the catalogue service

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;

use dix_core::{CasReply, CasRequest};

use crate::error::{Result, ServerError};
use crate::state::{SharedState, StoreStats};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: StoreStats,
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let state = state.read().await;
    Json(HealthResponse {
        status: "ready".to_string(),
        store: state.stats(),
    })
}

/// Execute one catalogue request
async fn cas(
    State(state): State<SharedState>,
    Json(request): Json<CasRequest>,
) -> Result<Json<CasReply>> {
    let mut state = state.write().await;
    Ok(Json(state.process(request)?))
}

async fn render_metrics(State(state): State<SharedState>) -> Result<String> {
    let state = state.read().await;
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(ServerError::MetricsDisabled)
}

/// Create the router with all routes
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cas", post(cas))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}
