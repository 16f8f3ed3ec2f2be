//! Image decoding and normalization into the classifier's input tensor.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{ImageError, ImageFormat, ImageReader, Limits};

/// Channels of the classifier input (RGB).
pub const CHANNELS: usize = 3;

/// Largest accepted width or height of an upload, in pixels.
pub const MAX_IMAGE_DIMENSION: u32 = 4096;

/// Decoder allocation budget per image.
pub const MAX_DECODE_ALLOC: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PreprocessError {
    #[error("unrecognized image format")]
    UnrecognizedFormat,
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("image exceeds decode limits: {0}")]
    TooLarge(String),
    #[error("image has no pixels")]
    Empty,
    #[error("expected {expected} samples after RGB conversion, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
}

/// Input tensor in NHWC layout with a batch dimension of one.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    /// Mean of all samples, used by diagnostics and fixture models.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}

/// Decodes uploads and scales them to the training-time input contract.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    width: u32,
    height: u32,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(32, 32)
    }
}

impl ImagePreprocessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn input_shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, CHANNELS]
    }

    /// Decode JPEG/PNG bytes, resize to the model input size and scale to [0, 1].
    pub fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
        let format = image::guess_format(bytes).map_err(|_| PreprocessError::UnrecognizedFormat)?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(PreprocessError::UnsupportedFormat(format!("{:?}", format)));
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
        limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
        limits.max_alloc = Some(MAX_DECODE_ALLOC);

        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.limits(limits);
        let decoded = reader.decode().map_err(|e| match e {
            ImageError::Limits(e) => PreprocessError::TooLarge(e.to_string()),
            e => PreprocessError::Decode(e.to_string()),
        })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(PreprocessError::Empty);
        }

        let rgb = decoded
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .to_rgb8();
        let raw = rgb.into_raw();

        let shape = self.input_shape();
        let expected = shape.iter().product::<usize>();
        if raw.len() != expected {
            return Err(PreprocessError::ChannelMismatch {
                expected,
                actual: raw.len(),
            });
        }

        let data = raw.into_iter().map(|v| f32::from(v) / 255.0).collect();
        Ok(ImageTensor { shape, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{encode_jpeg, encode_png, solid_rgb};
    use image::{DynamicImage, GrayImage, Luma};

    #[test]
    fn test_png_yields_fixed_shape_in_unit_range() {
        let png = encode_png(&solid_rgb(64, 48, [255, 128, 0]));
        let tensor = ImagePreprocessor::default().preprocess(&png).unwrap();

        assert_eq!(tensor.shape, [1, 32, 32, 3]);
        assert_eq!(tensor.data.len(), 32 * 32 * 3);
        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((tensor.data[0] - 1.0).abs() < 0.01);
        assert!((tensor.data[1] - 128.0 / 255.0).abs() < 0.01);
        assert!(tensor.data[2].abs() < 0.01);
    }

    #[test]
    fn test_jpeg_is_accepted() {
        let jpeg = encode_jpeg(&solid_rgb(32, 32, [10, 200, 30]));
        let tensor = ImagePreprocessor::default().preprocess(&jpeg).unwrap();
        assert_eq!(tensor.shape, [1, 32, 32, 3]);
        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_grayscale_is_expanded_to_rgb() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([51])));
        let png = encode_png(&gray);
        let tensor = ImagePreprocessor::default().preprocess(&png).unwrap();
        assert_eq!(tensor.data.len(), 32 * 32 * 3);
        assert!((tensor.mean() - 0.2).abs() < 0.01);
    }

    #[test]
    fn test_custom_input_size() {
        let png = encode_png(&solid_rgb(10, 10, [0, 0, 0]));
        let tensor = ImagePreprocessor::new(16, 8).preprocess(&png).unwrap();
        assert_eq!(tensor.shape, [1, 8, 16, 3]);
        assert_eq!(tensor.height(), 8);
        assert_eq!(tensor.width(), 16);
    }

    #[test]
    fn test_non_image_bytes_fail() {
        let err = ImagePreprocessor::default()
            .preprocess(b"definitely not an image")
            .unwrap_err();
        assert_eq!(err, PreprocessError::UnrecognizedFormat);
    }

    #[test]
    fn test_truncated_png_fails_to_decode() {
        let png = encode_png(&solid_rgb(32, 32, [1, 2, 3]));
        let truncated = &png[..png.len() / 2];
        let err = ImagePreprocessor::default().preprocess(truncated).unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
    }

    #[test]
    fn test_oversized_dimensions_are_rejected() {
        let wide = encode_png(&solid_rgb(MAX_IMAGE_DIMENSION + 1, 1, [0, 0, 0]));
        let err = ImagePreprocessor::default().preprocess(&wide).unwrap_err();
        assert!(matches!(err, PreprocessError::TooLarge(_)));

        let tall = encode_png(&solid_rgb(1, MAX_IMAGE_DIMENSION + 1, [0, 0, 0]));
        let err = ImagePreprocessor::default().preprocess(&tall).unwrap_err();
        assert!(matches!(err, PreprocessError::TooLarge(_)));
    }

    #[test]
    fn test_gif_is_rejected() {
        let err = ImagePreprocessor::default()
            .preprocess(b"GIF89a\x01\x00\x01\x00\x00\x00\x00;")
            .unwrap_err();
        assert!(matches!(err, PreprocessError::UnsupportedFormat(_)));
    }
}
