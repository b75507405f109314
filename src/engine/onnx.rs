//! ONNX Runtime backend for the primary (`withoutbg`) engine
//!
//! Loads an ISNet-style segmentation model once and serves inference for
//! the lifetime of the process. `ort` sessions need `&mut` to run, so the
//! session sits behind a mutex; requests for the same engine serialize at
//! the inference step.

use crate::engine::{preprocess, RemovalBackend};
use crate::error::{CutoutError, Result};
use image::{DynamicImage, GenericImageView, RgbaImage};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;

/// Square model input resolution
const TARGET_SIZE: u32 = 1024;

/// ONNX Runtime engine handle
pub struct OnnxBackend {
    session: Mutex<Session>,
}

impl OnnxBackend {
    /// Load the model file and build the inference session
    ///
    /// This is the slow one-time initialization; the adapter caches the
    /// returned handle for the rest of the process lifetime.
    pub fn load(model_path: &Path) -> Result<Self> {
        let model_data = std::fs::read(model_path).map_err(|e| {
            CutoutError::model(format!(
                "Failed to read model '{}': {e}",
                model_path.display()
            ))
        })?;

        let intra_threads = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| CutoutError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| CutoutError::model(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| CutoutError::model(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                CutoutError::model(format!(
                    "Failed to create session from '{}': {e}",
                    model_path.display()
                ))
            })?;

        tracing::info!(
            model = %model_path.display(),
            size_bytes = model_data.len(),
            "withoutbg engine initialized (ONNX Runtime)"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let input_value = Value::from_array(input.clone()).map_err(|e| {
            CutoutError::processing(format!("Failed to convert input tensor: {e}"))
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| CutoutError::processing("ONNX session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| CutoutError::processing(format!("ONNX inference failed: {e}")))?;

        // Positional output access: segmentation models expose the mask as
        // their first output.
        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| CutoutError::processing("No output tensors found"))?;
        let output = outputs
            .get(first_key)
            .ok_or_else(|| CutoutError::processing("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                CutoutError::processing(format!("Failed to extract output tensor: {e}"))
            })?;

        let shape = output.shape();
        if shape.len() != 4 {
            return Err(CutoutError::processing(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        }

        Array4::from_shape_vec(
            (
                shape.first().copied().unwrap_or(1),
                shape.get(1).copied().unwrap_or(1),
                shape.get(2).copied().unwrap_or(1),
                shape.get(3).copied().unwrap_or(1),
            ),
            output.view().to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| CutoutError::processing(format!("Failed to reshape output tensor: {e}")))
    }
}

impl RemovalBackend for OnnxBackend {
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let original_dimensions = image.dimensions();
        let tensor = preprocess::image_to_tensor(image, TARGET_SIZE)?;
        let output = self.infer(&tensor)?;
        let mask = preprocess::tensor_to_alpha(&output, original_dimensions)?;
        Ok(preprocess::apply_alpha(image, &mask))
    }
}
