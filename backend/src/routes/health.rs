use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use cifar_common::HealthResponse;

use crate::AppState;

/// GET /health - always 200; reports whether the classifier can be loaded.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let model = state.model.clone();
    let model_loaded = tokio::task::spawn_blocking(move || model.get().is_some())
        .await
        .unwrap_or(false);

    Json(HealthResponse::healthy(model_loaded))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}
