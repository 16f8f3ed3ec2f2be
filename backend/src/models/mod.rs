pub mod prediction;

pub use prediction::{PredictionRecord, StoredPrediction};
