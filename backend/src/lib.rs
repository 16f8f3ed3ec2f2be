pub mod config;
pub mod error;
pub mod routes;
pub mod auth;
pub mod audit;
pub mod classifier;
pub mod models;
pub mod logging;
pub mod pipeline;
pub mod preprocess;
pub mod rate_limit;
pub mod test_util;

pub use config::Config;
pub use error::ApiError;
pub use auth::ApiKeyAuth;
pub use audit::{AuditSink, PredictionLogger, SqliteAuditLog};
pub use classifier::{Classifier, ModelHandle, ModelLoader, OnnxLoader};
pub use pipeline::{RequestPipeline, Upload};
pub use preprocess::{ImagePreprocessor, ImageTensor, PreprocessError};
pub use rate_limit::RateLimiter;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub api_key: ApiKeyAuth,
    /// The process-wide classifier, loaded on first use.
    pub model: Arc<ModelHandle>,
    pub pipeline: Arc<RequestPipeline>,
}

impl AppState {
    pub fn new(config: Config, loader: Arc<dyn ModelLoader>, audit_sink: Arc<dyn AuditSink>) -> Self {
        let model = Arc::new(ModelHandle::new(&config.model.path, loader));
        let limiter = Arc::new(RateLimiter::per_minute(config.rate_limit.requests_per_minute));
        let preprocessor = ImagePreprocessor::new(config.model.input_width, config.model.input_height);
        let pipeline = Arc::new(RequestPipeline::new(
            model.clone(),
            limiter,
            preprocessor,
            PredictionLogger::new(audit_sink),
        ));

        Self {
            api_key: ApiKeyAuth::new(&config.auth.api_key),
            config,
            model,
            pipeline,
        }
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the full application: routes plus the middleware stack.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);
    let body_limit = DefaultBodyLimit::max(state.config.limits.max_body_bytes);

    routes::router(state)
        .layer(body_limit)
        .layer(middleware::from_fn(logging::request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
