//! Request pipeline: rate check, validation, preprocessing, scoring and
//! audit logging for single and batch predictions.
//!
//! Authentication happens earlier, in the API key middleware. Everything in
//! here is blocking (image decode, inference, SQLite) and is driven from
//! `spawn_blocking` by the route handlers.

use std::sync::Arc;

use axum::body::Bytes;
use cifar_common::{BatchEntry, BatchResponse, PredictionResult, ScoreError};

use crate::audit::PredictionLogger;
use crate::classifier::{Classifier, ModelError, ModelHandle};
use crate::error::{ApiError, Result};
use crate::preprocess::{ImagePreprocessor, ImageTensor};
use crate::rate_limit::RateLimiter;

/// Content types accepted for uploads.
pub const SUPPORTED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Filename recorded when the client didn't send one.
pub const DEFAULT_FILENAME: &str = "upload";

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(filename: Option<&str>, content_type: Option<&str>, bytes: Bytes) -> Self {
        Self {
            filename: filename.unwrap_or(DEFAULT_FILENAME).to_string(),
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }

    /// Whether the declared content type is JPEG or PNG (parameters ignored).
    pub fn has_supported_type(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|essence| {
                SUPPORTED_CONTENT_TYPES
                    .iter()
                    .any(|supported| essence.trim().eq_ignore_ascii_case(supported))
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, thiserror::Error)]
enum ScoringError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Score(#[from] ScoreError),
}

fn score(model: &dyn Classifier, tensor: &ImageTensor) -> std::result::Result<PredictionResult, ScoringError> {
    let scores = model.predict(tensor)?;
    Ok(PredictionResult::from_probabilities(&scores)?)
}

pub struct RequestPipeline {
    model: Arc<ModelHandle>,
    limiter: Arc<RateLimiter>,
    preprocessor: ImagePreprocessor,
    logger: PredictionLogger,
}

impl RequestPipeline {
    pub fn new(
        model: Arc<ModelHandle>,
        limiter: Arc<RateLimiter>,
        preprocessor: ImagePreprocessor,
        logger: PredictionLogger,
    ) -> Self {
        Self {
            model,
            limiter,
            preprocessor,
            logger,
        }
    }

    /// Rate-limit gate for `identity`.
    pub fn admit(&self, identity: &str) -> Result<()> {
        if self.limiter.allow(identity) {
            Ok(())
        } else {
            tracing::info!(identity, "Rate limit exceeded");
            Err(ApiError::RateLimited)
        }
    }

    /// Score one upload and log the prediction.
    pub fn predict_one(&self, identity: &str, upload: &Upload) -> Result<PredictionResult> {
        if !upload.has_supported_type() {
            return Err(ApiError::UnsupportedMediaType);
        }

        let tensor = self
            .preprocessor
            .preprocess(&upload.bytes)
            .map_err(|e| ApiError::Preprocess(e.to_string()))?;

        let model = self.model.get().ok_or(ApiError::ModelUnavailable)?;
        let result = score(model.as_ref(), &tensor)
            .map_err(|e| ApiError::InferenceFailed(e.to_string()))?;

        tracing::info!(
            identity,
            filename = %upload.filename,
            class = %result.class_name,
            confidence = result.confidence,
            "Prediction"
        );
        self.logger.record(identity, &upload.filename, &result);

        Ok(result)
    }

    /// Score every upload independently, preserving input order.
    ///
    /// Only a missing model fails the whole batch; any other failure becomes
    /// an error entry for that upload.
    pub fn predict_batch(&self, identity: &str, uploads: &[Upload]) -> Result<BatchResponse> {
        let model = self.model.get().ok_or(ApiError::ModelUnavailable)?;

        let results: Vec<BatchEntry> = uploads
            .iter()
            .map(|upload| self.score_entry(identity, model.as_ref(), upload))
            .collect();

        let scored = results.iter().filter(|entry| entry.is_scored()).count();
        tracing::info!(
            identity,
            total = results.len(),
            scored,
            "Batch prediction"
        );

        Ok(BatchResponse { results })
    }

    fn score_entry(&self, identity: &str, model: &dyn Classifier, upload: &Upload) -> BatchEntry {
        let filename = upload.filename.clone();
        if !upload.has_supported_type() {
            return BatchEntry::failed(filename, "Unsupported file type");
        }

        let tensor = match self.preprocessor.preprocess(&upload.bytes) {
            Ok(tensor) => tensor,
            Err(e) => return BatchEntry::failed(filename, format!("Preprocess error: {}", e)),
        };

        match score(model, &tensor) {
            Ok(result) => {
                self.logger.record(identity, &filename, &result);
                BatchEntry::scored(filename, result)
            }
            Err(e) => BatchEntry::failed(filename, format!("Inference error: {}", e)),
        }
    }
}
