use chrono::{DateTime, Utc};

use cifar_common::PredictionResult;

/// Timestamp format of the audit table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One scored image, as appended to the audit log.
#[derive(Debug, Clone)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    /// Client identity the request was rate-limited under
    pub client_ip: String,
    /// Uploaded filename, `upload` when the client sent none
    pub filename: String,
    pub predicted_class: String,
    pub confidence: f32,
    /// JSON object of label -> probability
    pub details: String,
}

impl PredictionRecord {
    pub fn new(client_ip: &str, filename: &str, result: &PredictionResult) -> Self {
        Self {
            timestamp: Utc::now(),
            client_ip: client_ip.to_string(),
            filename: filename.to_string(),
            predicted_class: result.class_name.to_string(),
            confidence: result.confidence,
            details: serde_json::to_string(&result.predictions).unwrap_or_default(),
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// A row read back from the audit log.
#[derive(Debug, Clone)]
pub struct StoredPrediction {
    pub id: i64,
    pub timestamp: String,
    pub client_ip: String,
    pub filename: String,
    pub predicted_class: String,
    pub confidence: f64,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_result() -> PredictionResult {
        let mut scores = vec![0.01; 10];
        scores[3] = 0.91;
        PredictionResult::from_probabilities(&scores).unwrap()
    }

    #[test]
    fn test_record_from_result() {
        let record = PredictionRecord::new("127.0.0.1", "kitten.png", &cat_result());
        assert_eq!(record.client_ip, "127.0.0.1");
        assert_eq!(record.filename, "kitten.png");
        assert_eq!(record.predicted_class, "cat");
        assert!((record.confidence - 0.91).abs() < 1e-6);
    }

    #[test]
    fn test_details_is_label_map() {
        let record = PredictionRecord::new("127.0.0.1", "kitten.png", &cat_result());
        let details: serde_json::Value = serde_json::from_str(&record.details).unwrap();
        let map = details.as_object().unwrap();
        assert_eq!(map.len(), 10);
        assert!(map.contains_key("airplane"));
        assert!(map.contains_key("truck"));
    }

    #[test]
    fn test_timestamp_format() {
        let record = PredictionRecord::new("127.0.0.1", "kitten.png", &cat_result());
        let formatted = record.formatted_timestamp();
        assert_eq!(formatted.len(), 19);
        assert!(chrono::NaiveDateTime::parse_from_str(&formatted, TIMESTAMP_FORMAT).is_ok());
    }
}
