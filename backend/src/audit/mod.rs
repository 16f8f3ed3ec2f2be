//! Prediction audit logging.

mod sqlite;

pub use sqlite::SqliteAuditLog;

use std::sync::Arc;

use cifar_common::PredictionResult;

use crate::models::PredictionRecord;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

/// Append-only store for prediction records.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &PredictionRecord) -> Result<(), AuditError>;
}

/// Best-effort prediction logger.
///
/// A failed write never affects the response already computed for the
/// client; it is only reported through tracing.
#[derive(Clone)]
pub struct PredictionLogger {
    sink: Arc<dyn AuditSink>,
}

impl PredictionLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn record(&self, client_ip: &str, filename: &str, result: &PredictionResult) {
        let record = PredictionRecord::new(client_ip, filename, result);
        if let Err(e) = self.sink.append(&record) {
            tracing::warn!(
                client_ip,
                filename,
                "Failed to log prediction: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FailingSink;

    fn result() -> PredictionResult {
        PredictionResult::from_probabilities(&[0.1; 10]).unwrap()
    }

    #[test]
    fn test_record_appends_to_sink() {
        let log = Arc::new(SqliteAuditLog::new(":memory:").unwrap());
        let logger = PredictionLogger::new(log.clone());

        logger.record("10.1.1.1", "plane.jpg", &result());

        let rows = log.recent(1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].filename, "plane.jpg");
        assert_eq!(rows[0].predicted_class, "airplane");
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let sink = Arc::new(FailingSink::default());
        let logger = PredictionLogger::new(sink.clone());

        logger.record("10.1.1.1", "plane.jpg", &result());
        assert_eq!(sink.attempts(), 1);
    }
}
