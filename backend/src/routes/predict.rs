use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, ConnectInfo, Multipart, State},
    middleware,
    routing::post,
    Json, Router,
};
use cifar_common::{BatchResponse, PredictionResult};

use crate::auth::require_api_key;
use crate::error::{ApiError, Result};
use crate::pipeline::Upload;
use crate::AppState;

/// Multipart field holding the single-image upload.
const FILE_FIELD: &str = "file";
/// Multipart field (repeated) holding batch uploads.
const FILES_FIELD: &str = "files";

/// Identity used for rate limiting: the peer IP.
fn client_identity(connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Collect uploads from fields named `field_name`, at most `max` of them.
async fn read_uploads(multipart: &mut Multipart, field_name: &str, max: usize) -> Result<Vec<Upload>> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        if uploads.len() == max {
            return Err(ApiError::InvalidRequest(format!(
                "Too many files (max {})",
                max
            )));
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

        uploads.push(Upload::new(filename.as_deref(), content_type.as_deref(), bytes));
    }

    Ok(uploads)
}

/// POST /predict - classify one uploaded image.
async fn predict(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>> {
    let identity = client_identity(connect_info);
    state.pipeline.admit(&identity)?;

    let mut multipart = multipart.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let upload = read_uploads(&mut multipart, FILE_FIELD, 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::InvalidRequest(format!("Missing '{}' field", FILE_FIELD)))?;

    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.predict_one(&identity, &upload))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(result))
}

/// POST /predict/batch - classify several images, one result per upload.
async fn predict_batch(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<BatchResponse>> {
    let identity = client_identity(connect_info);
    // One rate-limit check covers the whole batch.
    state.pipeline.admit(&identity)?;

    let mut multipart = multipart.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let uploads = read_uploads(&mut multipart, FILES_FIELD, state.config.limits.max_batch_files).await?;
    if uploads.is_empty() {
        return Err(ApiError::InvalidRequest(format!(
            "Missing '{}' field",
            FILES_FIELD
        )));
    }

    let pipeline = state.pipeline.clone();
    let response = tokio::task::spawn_blocking(move || pipeline.predict_batch(&identity, &uploads))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(response))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_client_identity_uses_peer_ip() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), 51234);
        assert_eq!(client_identity(Some(ConnectInfo(addr))), "10.0.0.7");
    }

    #[test]
    fn test_client_identity_unknown_without_connect_info() {
        assert_eq!(client_identity(None), "unknown");
    }
}
