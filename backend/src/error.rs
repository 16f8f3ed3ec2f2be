//! HTTP-facing error type for the prediction API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Every gate failure of the request pipeline maps to one variant.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid API Key")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Only JPEG and PNG images are supported")]
    UnsupportedMediaType,

    #[error("Error preprocessing image: {0}")]
    Preprocess(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model not loaded")]
    ModelUnavailable,

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UnsupportedMediaType
            | ApiError::Preprocess(_)
            | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InferenceFailed(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::RateLimited => "rate_limited",
            ApiError::UnsupportedMediaType => "unsupported_media",
            ApiError::Preprocess(_) => "preprocess_failed",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::ModelUnavailable => "model_unavailable",
            ApiError::InferenceFailed(_) => "inference_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
