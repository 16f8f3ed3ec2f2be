//! ONNX classifier backed by tract.

use std::path::Path;
use std::sync::Arc;

use cifar_common::normalize_scores;
use tract_onnx::prelude::*;

use super::{Classifier, ModelError, ModelLoader};
use crate::preprocess::ImageTensor;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Loads ONNX exports of the trained network with a fixed NHWC input.
#[derive(Debug, Clone, Copy)]
pub struct OnnxLoader {
    input_shape: [usize; 4],
}

impl OnnxLoader {
    pub fn new(input_shape: [usize; 4]) -> Self {
        Self { input_shape }
    }
}

impl ModelLoader for OnnxLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Classifier>, ModelError> {
        let [n, h, w, c] = self.input_shape;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(n, h, w, c)),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| ModelError::Load(e.to_string()))?;

        Ok(Arc::new(OnnxClassifier {
            plan,
            input_shape: self.input_shape,
        }))
    }
}

pub struct OnnxClassifier {
    plan: OnnxPlan,
    input_shape: [usize; 4],
}

impl Classifier for OnnxClassifier {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        if input.shape != self.input_shape {
            return Err(ModelError::InputShape {
                expected: self.input_shape,
                actual: input.shape,
            });
        }

        let tensor = Tensor::from_shape(&input.shape, &input.data)
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let output = outputs
            .first()
            .ok_or_else(|| ModelError::Inference("model produced no outputs".to_string()))?;
        let scores: Vec<f32> = output
            .to_array_view::<f32>()
            .map_err(|e| ModelError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();

        Ok(normalize_scores(scores))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_corrupt_file_is_load_error() {
        let mut artifact = NamedTempFile::new().unwrap();
        artifact.write_all(b"not an onnx protobuf").unwrap();

        let result = OnnxLoader::new([1, 32, 32, 3]).load(artifact.path());
        assert!(matches!(result, Err(ModelError::Load(_))));
    }
}
