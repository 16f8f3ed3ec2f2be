mod api_key;

pub use api_key::{ApiKeyAuth, AuthError, API_KEY_HEADER};

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::AppState;

/// Middleware that requires a valid API key.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match state.api_key.authenticate(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!("Rejected {}: {}", request.uri().path(), e);
            ApiError::Unauthorized.into_response()
        }
    }
}
