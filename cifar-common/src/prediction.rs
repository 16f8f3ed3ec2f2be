//! Prediction result types returned by the API.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::labels::{ClassLabel, NUM_CLASSES};

/// Scores whose sum is within this distance of 1.0 are already a distribution.
const DISTRIBUTION_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("Expected {expected} class scores, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("Score at index {0} is not a finite number")]
    NonFinite(usize),
}

/// Turn raw classifier output into a probability distribution.
///
/// Softmax outputs pass through (renormalized for float drift); anything else
/// is treated as logits and run through a numerically stable softmax.
pub fn normalize_scores(scores: Vec<f32>) -> Vec<f32> {
    if scores.is_empty() {
        return scores;
    }

    let sum: f32 = scores.iter().sum();
    let in_range = scores.iter().all(|s| (0.0..=1.0).contains(s));
    if in_range && (sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE {
        return scores.into_iter().map(|s| s / sum).collect();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Label to probability mapping, serialized as a JSON object in label order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities(Vec<(ClassLabel, f32)>);

impl ClassProbabilities {
    pub fn get(&self, label: ClassLabel) -> Option<f32> {
        self.0.iter().find(|(l, _)| *l == label).map(|(_, p)| *p)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f32 {
        self.0.iter().map(|(_, p)| p).sum()
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, probability) in &self.0 {
            map.serialize_entry(label.as_str(), probability)?;
        }
        map.end()
    }
}

/// Response for a single scored image.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub class_name: ClassLabel,
    pub confidence: f32,
    pub predictions: ClassProbabilities,
}

impl PredictionResult {
    /// Build a result from one probability per class, in label order.
    ///
    /// The top class is the first index holding the maximum probability.
    pub fn from_probabilities(scores: &[f32]) -> Result<Self, ScoreError> {
        if scores.len() != NUM_CLASSES {
            return Err(ScoreError::WrongLength {
                expected: NUM_CLASSES,
                actual: scores.len(),
            });
        }
        if let Some(index) = scores.iter().position(|s| !s.is_finite()) {
            return Err(ScoreError::NonFinite(index));
        }

        let mut top = 0;
        for (i, &score) in scores.iter().enumerate().skip(1) {
            if score > scores[top] {
                top = i;
            }
        }

        let predictions = ClassLabel::ALL
            .iter()
            .zip(scores.iter())
            .map(|(label, p)| (*label, *p))
            .collect();

        Ok(Self {
            class_name: ClassLabel::ALL[top],
            confidence: scores[top],
            predictions: ClassProbabilities(predictions),
        })
    }
}

/// One entry of a batch response: either a scored image or a per-image error.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Scored {
        filename: String,
        class: ClassLabel,
        confidence: f32,
        predictions: ClassProbabilities,
    },
    Failed {
        filename: String,
        error: String,
    },
}

impl BatchEntry {
    pub fn scored(filename: String, result: PredictionResult) -> Self {
        BatchEntry::Scored {
            filename,
            class: result.class_name,
            confidence: result.confidence,
            predictions: result.predictions,
        }
    }

    pub fn failed(filename: String, error: impl Into<String>) -> Self {
        BatchEntry::Failed {
            filename,
            error: error.into(),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            BatchEntry::Scored { filename, .. } | BatchEntry::Failed { filename, .. } => filename,
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self, BatchEntry::Scored { .. })
    }
}

/// Response for the batch endpoint, one entry per upload in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

impl HealthResponse {
    pub fn healthy(model_loaded: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            model_loaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(index: usize, value: f32) -> Vec<f32> {
        let rest = (1.0 - value) / (NUM_CLASSES as f32 - 1.0);
        (0..NUM_CLASSES)
            .map(|i| if i == index { value } else { rest })
            .collect()
    }

    #[test]
    fn test_from_probabilities_picks_max() {
        let result = PredictionResult::from_probabilities(&one_hot(3, 0.8)).unwrap();
        assert_eq!(result.class_name, ClassLabel::Cat);
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert_eq!(result.predictions.len(), NUM_CLASSES);
        assert!(!result.predictions.is_empty());
        assert!((result.predictions.total() - 1.0).abs() < 1e-4);
        assert_eq!(result.predictions.get(ClassLabel::Cat), Some(result.confidence));
        assert!(result.predictions.get(ClassLabel::Dog).unwrap() < result.confidence);
    }

    #[test]
    fn test_from_probabilities_first_max_wins_on_tie() {
        let mut scores = vec![0.0; NUM_CLASSES];
        scores[2] = 0.5;
        scores[7] = 0.5;
        let result = PredictionResult::from_probabilities(&scores).unwrap();
        assert_eq!(result.class_name, ClassLabel::Bird);
    }

    #[test]
    fn test_from_probabilities_uniform_picks_first() {
        let scores = vec![0.1; NUM_CLASSES];
        let result = PredictionResult::from_probabilities(&scores).unwrap();
        assert_eq!(result.class_name, ClassLabel::Airplane);
    }

    #[test]
    fn test_from_probabilities_rejects_wrong_length() {
        let err = PredictionResult::from_probabilities(&[0.5, 0.5]).unwrap_err();
        assert_eq!(
            err,
            ScoreError::WrongLength {
                expected: 10,
                actual: 2
            }
        );
    }

    #[test]
    fn test_from_probabilities_rejects_nan() {
        let mut scores = one_hot(0, 0.9);
        scores[4] = f32::NAN;
        let err = PredictionResult::from_probabilities(&scores).unwrap_err();
        assert_eq!(err, ScoreError::NonFinite(4));
    }

    #[test]
    fn test_normalize_keeps_distribution() {
        let scores = one_hot(5, 0.6);
        let normalized = normalize_scores(scores.clone());
        for (a, b) in scores.iter().zip(normalized.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalize_applies_softmax_to_logits() {
        let logits = vec![2.0, -1.0, 0.5, 7.0, 0.0, 0.0, -3.0, 1.0, 1.5, 0.2];
        let normalized = normalize_scores(logits);
        let sum: f32 = normalized.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(normalized.iter().all(|p| (0.0..=1.0).contains(p)));
        let result = PredictionResult::from_probabilities(&normalized).unwrap();
        assert_eq!(result.class_name, ClassLabel::Cat);
    }

    #[test]
    fn test_predictions_serialize_in_label_order() {
        let result = PredictionResult::from_probabilities(&one_hot(0, 0.91)).unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.starts_with(r#"{"class_name":"airplane","confidence":0.91,"predictions":{"airplane":0.91"#));
        let truck = json.find("\"truck\"").unwrap();
        let ship = json.find("\"ship\"").unwrap();
        assert!(ship < truck);
    }

    #[test]
    fn test_batch_entry_untagged_shapes() {
        let scored = BatchEntry::scored(
            "a.png".to_string(),
            PredictionResult::from_probabilities(&one_hot(9, 0.7)).unwrap(),
        );
        let failed = BatchEntry::failed("b.png".to_string(), "Unsupported file type");

        let scored_json = serde_json::to_value(&scored).unwrap();
        assert_eq!(scored_json["filename"], "a.png");
        assert_eq!(scored_json["class"], "truck");
        assert!(scored_json.get("error").is_none());

        let failed_json = serde_json::to_value(&failed).unwrap();
        assert_eq!(failed_json["error"], "Unsupported file type");
        assert!(failed_json.get("class").is_none());
        assert!(!failed.is_scored());
        assert_eq!(failed.filename(), "b.png");
    }

    #[test]
    fn test_health_response() {
        let json = serde_json::to_string(&HealthResponse::healthy(false)).unwrap();
        assert_eq!(json, r#"{"status":"healthy","model_loaded":false}"#);
    }
}
