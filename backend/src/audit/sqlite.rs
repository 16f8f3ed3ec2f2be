use std::path::Path;
use std::sync::Mutex;
use rusqlite::{Connection, params};

use super::{AuditError, AuditSink};
use crate::models::{PredictionRecord, StoredPrediction};

/// SQLite-backed, append-only prediction log.
pub struct SqliteAuditLog {
    conn: Mutex<Connection>,
}

impl SqliteAuditLog {
    pub fn new(database_url: &str) -> Result<Self, AuditError> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        // Create parent directories if needed
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuditError::IoError(e.to_string()))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT,
                client_ip TEXT,
                filename TEXT,
                predicted_class TEXT,
                confidence REAL,
                details TEXT
            )",
            [],
        ).map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_predictions_timestamp ON predictions(timestamp)",
            [],
        ).map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        tracing::info!("Prediction log initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Total number of logged predictions.
    pub fn count(&self) -> Result<u64, AuditError> {
        let conn = self.conn.lock()
            .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))
            .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        Ok(count as u64)
    }

    /// Most recent predictions, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<StoredPrediction>, AuditError> {
        let conn = self.conn.lock()
            .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, client_ip, filename, predicted_class, confidence, details
                 FROM predictions ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(StoredPrediction {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    client_ip: row.get(2)?,
                    filename: row.get(3)?,
                    predicted_class: row.get(4)?,
                    confidence: row.get(5)?,
                    details: row.get(6)?,
                })
            })
            .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| AuditError::DatabaseError(e.to_string()))
    }
}

impl AuditSink for SqliteAuditLog {
    fn append(&self, record: &PredictionRecord) -> Result<(), AuditError> {
        let conn = self.conn.lock()
            .map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        conn.execute(
            "INSERT INTO predictions (timestamp, client_ip, filename, predicted_class, confidence, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.formatted_timestamp(),
                record.client_ip,
                record.filename,
                record.predicted_class,
                f64::from(record.confidence),
                record.details,
            ],
        ).map_err(|e| AuditError::DatabaseError(e.to_string()))?;

        tracing::debug!("Logged prediction for {} from {}", record.filename, record.client_ip);
        Ok(())
    }
}
