pub mod health;
pub mod predict;

use std::sync::Arc;

use axum::Router;

use crate::AppState;

/// All API routes, without the outer middleware stack.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router(state.clone()))
        .merge(predict::router(state))
}
