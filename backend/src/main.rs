use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cifar_serve_backend::{build_app, AppState, Config, ImagePreprocessor, OnnxLoader, SqliteAuditLog};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.logging.level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CIFAR-10 Prediction API");

    if config.uses_default_api_key() {
        tracing::warn!("API_KEY not set, using the built-in development key");
    }

    // Initialize components
    let audit_log = SqliteAuditLog::new(&config.database.url)?;
    let input_shape = ImagePreprocessor::new(config.model.input_width, config.model.input_height).input_shape();
    let loader = OnnxLoader::new(input_shape);

    let state = Arc::new(AppState::new(config.clone(), Arc::new(loader), Arc::new(audit_log)));
    tracing::info!("API key fingerprint: {}", state.api_key.fingerprint());

    // Warm the model so the first request doesn't pay for the load
    tracing::info!("Starting up -> loading model from {}", state.model.path().display());
    let model = state.model.clone();
    let loaded = tokio::task::spawn_blocking(move || model.get().is_some()).await?;
    tracing::info!("Model loaded (or attempted): loaded={}", loaded);

    let app = build_app(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
