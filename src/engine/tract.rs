//! Tract backend for the fallback (`rembg`) engine
//!
//! Pure-Rust inference with no native runtime dependency. Loads a
//! U2Net-style segmentation model once; the optimized plan is immutable
//! and shared across concurrent requests without locking.

use crate::engine::{preprocess, RemovalBackend};
use crate::error::{CutoutError, Result};
use image::{DynamicImage, GenericImageView, RgbaImage};
use ndarray::Array4;
use std::path::Path;
use tract_onnx::prelude::*;

/// Type alias for the runnable Tract model
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Square model input resolution
const TARGET_SIZE: u32 = 320;

/// Tract engine handle
pub struct TractBackend {
    model: TractModel,
}

impl TractBackend {
    /// Load the model file and build the optimized runnable plan
    pub fn load(model_path: &Path) -> Result<Self> {
        let model_data = std::fs::read(model_path).map_err(|e| {
            CutoutError::model(format!(
                "Failed to read model '{}': {e}",
                model_path.display()
            ))
        })?;

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(&model_data))
            .map_err(|e| CutoutError::model(format!("Failed to load ONNX model: {e}")))?
            .into_optimized()
            .map_err(|e| CutoutError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| CutoutError::model(format!("Failed to create runnable model: {e}")))?;

        tracing::info!(
            model = %model_path.display(),
            size_bytes = model_data.len(),
            "rembg engine initialized (Tract, pure Rust)"
        );

        Ok(Self { model })
    }

    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let input_tensor = Tensor::from(input.clone());

        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| CutoutError::processing(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| CutoutError::processing("No output tensor found"))?
            .into_arc_tensor();

        let output = output_tensor.to_array_view::<f32>().map_err(|e| {
            CutoutError::processing(format!("Failed to convert output tensor: {e}"))
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
            output.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| CutoutError::processing(format!("Failed to reshape output tensor: {e}")))
    }
}

impl RemovalBackend for TractBackend {
    fn remove_background(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let original_dimensions = image.dimensions();
        let tensor = preprocess::image_to_tensor(image, TARGET_SIZE)?;
        let output = self.infer(&tensor)?;
        let mask = preprocess::tensor_to_alpha(&output, original_dimensions)?;
        Ok(preprocess::apply_alpha(image, &mask))
    }
}
