//! Fixtures shared by unit and integration tests.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::audit::{AuditError, AuditSink};
use crate::classifier::{Classifier, ModelError, ModelLoader};
use crate::config::{
    AuthConfig, Config, CorsConfig, DatabaseConfig, LimitsConfig, LoggingConfig, ModelConfig,
    RateLimitConfig,
};
use crate::models::PredictionRecord;
use crate::preprocess::ImageTensor;

pub const TEST_API_KEY: &str = "test-key";

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 8000,
        auth: AuthConfig {
            api_key: TEST_API_KEY.to_string(),
        },
        model: ModelConfig::default(),
        rate_limit: RateLimitConfig {
            requests_per_minute: 60,
        },
        database: DatabaseConfig {
            url: ":memory:".to_string(),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        cors: CorsConfig::default(),
        limits: LimitsConfig::default(),
    }
}

/// Fixture model: the mean brightness of the input picks the class.
///
/// Brightness in `[k/10, (k+1)/10)` scores class `k` at 0.91, every other
/// class at 0.01. A uniform gray of about 0.35 is therefore a "cat".
pub struct BrightnessClassifier;

impl BrightnessClassifier {
    pub const CONFIDENCE: f32 = 0.91;

    pub fn uniform_tensor(value: f32) -> ImageTensor {
        ImageTensor {
            shape: [1, 32, 32, 3],
            data: vec![value; 32 * 32 * 3],
        }
    }
}

impl Classifier for BrightnessClassifier {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        let bucket = ((input.mean() * 10.0) as usize).min(9);
        Ok((0..10)
            .map(|i| if i == bucket { Self::CONFIDENCE } else { 0.01 })
            .collect())
    }
}

/// Fixture model whose inference always fails.
pub struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn predict(&self, _input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        Err(ModelError::Inference("fixture failure".to_string()))
    }
}

/// Loader that counts calls and yields a [`BrightnessClassifier`].
pub struct CountingLoader {
    pub loads: AtomicUsize,
    delay: Duration,
    failures_left: AtomicUsize,
}

impl CountingLoader {
    pub fn new(delay: Duration) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            delay,
            failures_left: AtomicUsize::new(0),
        }
    }

    /// Fail the first `failures` loads as if the artifact were corrupt.
    pub fn failing_first(failures: usize) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            delay: Duration::ZERO,
            failures_left: AtomicUsize::new(failures),
        }
    }
}

impl ModelLoader for CountingLoader {
    fn load(&self, _path: &Path) -> Result<Arc<dyn Classifier>, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ModelError::Load("corrupt fixture artifact".to_string()));
        }

        Ok(Arc::new(BrightnessClassifier))
    }
}

/// Loader handing out a prebuilt classifier.
pub struct StaticLoader(Arc<dyn Classifier>);

impl StaticLoader {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self(classifier)
    }
}

impl ModelLoader for StaticLoader {
    fn load(&self, _path: &Path) -> Result<Arc<dyn Classifier>, ModelError> {
        Ok(self.0.clone())
    }
}

/// Audit sink that is always unavailable.
#[derive(Default)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl AuditSink for FailingSink {
    fn append(&self, _record: &PredictionRecord) -> Result<(), AuditError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditError::DatabaseError("storage unavailable".to_string()))
    }
}

pub fn solid_rgb(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

pub fn encode_png(image: &DynamicImage) -> Vec<u8> {
    encode(image, ImageFormat::Png)
}

pub fn encode_jpeg(image: &DynamicImage) -> Vec<u8> {
    encode(image, ImageFormat::Jpeg)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, format)
        .expect("Failed to encode fixture image");
    buf.into_inner()
}
