//! Classifier abstraction and the lazily loaded, process-wide model handle.

mod onnx;

pub use onnx::{OnnxClassifier, OnnxLoader};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use crate::preprocess::ImageTensor;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Input shape {actual:?} does not match model input {expected:?}")]
    InputShape {
        expected: [usize; 4],
        actual: [usize; 4],
    },
    #[error("{0}")]
    Inference(String),
}

/// A trained image classifier producing one score per class.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError>;
}

/// Loads a classifier artifact from disk.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>, ModelError>;
}

/// How long a failed load is remembered before an unchanged artifact is
/// parsed again.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// A load attempt that failed, and the artifact version it failed on.
struct FailedLoad {
    at: Instant,
    modified: Option<SystemTime>,
}

/// Owns the single classifier instance of the process.
///
/// The first successful `get()` loads the artifact; afterwards the model is
/// shared read-only and callers never contend on the init lock. A failed load
/// leaves the slot empty. It is retried once the artifact's modification time
/// changes or the retry backoff has passed.
pub struct ModelHandle {
    path: PathBuf,
    loader: Arc<dyn ModelLoader>,
    model: OnceLock<Arc<dyn Classifier>>,
    retry_backoff: Duration,
    init_lock: Mutex<Option<FailedLoad>>,
}

impl ModelHandle {
    pub fn new(path: impl Into<PathBuf>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            path: path.into(),
            loader,
            model: OnceLock::new(),
            retry_backoff: RETRY_BACKOFF,
            init_lock: Mutex::new(None),
        }
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the shared classifier, loading it on first use.
    ///
    /// `None` means the model is unavailable; the reason has been logged.
    pub fn get(&self) -> Option<Arc<dyn Classifier>> {
        if let Some(model) = self.model.get() {
            return Some(model.clone());
        }

        let mut last_failure = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(model) = self.model.get() {
            return Some(model.clone());
        }

        let modified = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.modified().ok(),
            Err(_) => {
                tracing::warn!("Model unavailable: {}", ModelError::NotFound(self.path.clone()));
                return None;
            }
        };

        if let Some(failed) = last_failure.as_ref() {
            if failed.modified == modified && failed.at.elapsed() < self.retry_backoff {
                tracing::debug!("Model artifact unchanged since failed load, not retrying yet");
                return None;
            }
        }

        match self.loader.load(&self.path) {
            Ok(model) => {
                *last_failure = None;
                tracing::info!("Model loaded successfully from {}", self.path.display());
                Some(self.model.get_or_init(|| model).clone())
            }
            Err(e) => {
                tracing::warn!("Model unavailable: {}", e);
                *last_failure = Some(FailedLoad {
                    at: Instant::now(),
                    modified,
                });
                None
            }
        }
    }

    /// Whether a model has been loaded, without attempting a load.
    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{BrightnessClassifier, CountingLoader};
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_artifact_is_unavailable() {
        let loader = Arc::new(CountingLoader::new(Duration::ZERO));
        let handle = ModelHandle::new("/nonexistent/best_model.onnx", loader.clone());

        assert!(handle.get().is_none());
        assert!(!handle.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_get_loads_once_and_caches() {
        let artifact = NamedTempFile::new().unwrap();
        let loader = Arc::new(CountingLoader::new(Duration::ZERO));
        let handle = ModelHandle::new(artifact.path(), loader.clone());

        assert!(handle.get().is_some());
        assert!(handle.get().is_some());
        assert!(handle.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_calls_load_once() {
        let artifact = NamedTempFile::new().unwrap();
        let loader = Arc::new(CountingLoader::new(Duration::from_millis(50)));
        let handle = Arc::new(ModelHandle::new(artifact.path(), loader.clone()));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                thread::spawn(move || handle.get().is_some())
            })
            .collect();

        for worker in workers {
            assert!(worker.join().unwrap());
        }
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_corrupt_artifact_is_not_reparsed_within_backoff() {
        let artifact = NamedTempFile::new().unwrap();
        let loader = Arc::new(CountingLoader::failing_first(1));
        let handle = ModelHandle::new(artifact.path(), loader.clone());

        assert!(handle.get().is_none());
        assert!(handle.get().is_none());
        assert!(handle.get().is_none());
        assert!(!handle.is_loaded());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_corrupt_artifact_is_retried_after_backoff() {
        let artifact = NamedTempFile::new().unwrap();
        let loader = Arc::new(CountingLoader::failing_first(1));
        let handle =
            ModelHandle::new(artifact.path(), loader.clone()).with_retry_backoff(Duration::ZERO);

        assert!(handle.get().is_none());
        assert!(!handle.is_loaded());
        assert!(handle.get().is_some());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_replaced_artifact_is_retried_immediately() {
        let artifact = NamedTempFile::new().unwrap();
        let loader = Arc::new(CountingLoader::failing_first(1));
        let handle = ModelHandle::new(artifact.path(), loader.clone());

        assert!(handle.get().is_none());
        artifact
            .as_file()
            .set_modified(SystemTime::now() + Duration::from_secs(3600))
            .unwrap();

        assert!(handle.get().is_some());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_loaded_model_predicts() {
        let artifact = NamedTempFile::new().unwrap();
        let handle = ModelHandle::new(artifact.path(), Arc::new(CountingLoader::new(Duration::ZERO)));
        let model = handle.get().unwrap();
        let scores = model
            .predict(&BrightnessClassifier::uniform_tensor(0.35))
            .unwrap();
        assert_eq!(scores.len(), 10);
    }
}
