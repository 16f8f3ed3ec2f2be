//! CIFAR-10 Common Types
//!
//! Shared types used by the prediction backend and its clients.

pub mod labels;
pub mod prediction;

pub use labels::{ClassLabel, NUM_CLASSES};
pub use prediction::{
    normalize_scores, BatchEntry, BatchResponse, HealthResponse, PredictionResult, ScoreError,
};
