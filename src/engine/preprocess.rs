//! Tensor preprocessing and mask application
//!
//! Both engines run square-input segmentation models, so they share the
//! same pipeline: aspect-preserving resize onto a padded square canvas,
//! ImageNet-style normalization into an NCHW tensor, and the inverse
//! mapping that turns the model's single-channel output back into a
//! per-pixel alpha mask at the original resolution.

use crate::error::{CutoutError, Result};
use image::{DynamicImage, ImageBuffer, Rgba, RgbaImage};
use ndarray::Array4;

const NORMALIZATION_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const NORMALIZATION_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Forward-fit parameters for a square model input; also used to invert
/// the mapping when reading the output mask
struct SquareFit {
    scale: f32,
    offset_x: u32,
    offset_y: u32,
}

fn square_fit(orig_width: u32, orig_height: u32, target_size: u32) -> SquareFit {
    let target = target_size as f32;
    let scale = target.min((target / orig_width as f32).min(target / orig_height as f32));
    let scaled_width = (orig_width as f32 * scale).round() as u32;
    let scaled_height = (orig_height as f32 * scale).round() as u32;
    SquareFit {
        scale,
        offset_x: (target_size - scaled_width) / 2,
        offset_y: (target_size - scaled_height) / 2,
    }
}

/// Convert an image into a normalized `[1, 3, S, S]` tensor, white-padding
/// around the aspect-preserved content
pub(crate) fn image_to_tensor(image: &DynamicImage, target_size: u32) -> Result<Array4<f32>> {
    let rgb = image.to_rgb8();
    let (orig_width, orig_height) = rgb.dimensions();
    if orig_width == 0 || orig_height == 0 {
        return Err(CutoutError::processing("Cannot process a zero-sized image"));
    }

    let fit = square_fit(orig_width, orig_height, target_size);
    let scaled_width = (orig_width as f32 * fit.scale).round() as u32;
    let scaled_height = (orig_height as f32 * fit.scale).round() as u32;

    let resized = image::imageops::resize(
        &rgb,
        scaled_width,
        scaled_height,
        image::imageops::FilterType::Triangle,
    );

    let mut canvas = ImageBuffer::from_pixel(target_size, target_size, image::Rgb([255, 255, 255]));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let canvas_x = x + fit.offset_x;
        let canvas_y = y + fit.offset_y;
        if canvas_x < target_size && canvas_y < target_size {
            canvas.put_pixel(canvas_x, canvas_y, *pixel);
        }
    }

    let size = target_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (y, row) in canvas.rows().enumerate() {
        for (x, pixel) in row.enumerate() {
            for channel in 0..3 {
                let normalized = (f32::from(pixel[channel]) / 255.0
                    - NORMALIZATION_MEAN[channel])
                    / NORMALIZATION_STD[channel];
                tensor[[0, channel, y, x]] = normalized;
            }
        }
    }

    Ok(tensor)
}

/// Map a `[1, 1, S, S]` output tensor back to a row-major alpha mask at the
/// original image resolution
pub(crate) fn tensor_to_alpha(
    tensor: &Array4<f32>,
    original_dimensions: (u32, u32),
) -> Result<Vec<u8>> {
    let shape = tensor.shape();
    if shape.first().copied().unwrap_or(0) != 1 || shape.get(1).copied().unwrap_or(0) != 1 {
        return Err(CutoutError::processing(format!(
            "Unexpected output tensor shape {shape:?}, expected [1, 1, H, W]"
        )));
    }
    let mask_height = shape.get(2).copied().unwrap_or(0) as u32;
    let mask_width = shape.get(3).copied().unwrap_or(0) as u32;

    let (orig_width, orig_height) = original_dimensions;
    // The model input is square, so the output side length gives us back
    // the forward transform to invert.
    let fit = square_fit(orig_width, orig_height, mask_width);

    let mut mask = Vec::with_capacity((orig_width * orig_height) as usize);
    for y in 0..orig_height {
        for x in 0..orig_width {
            let tensor_x = (x as f32 * fit.scale).round() as u32 + fit.offset_x;
            let tensor_y = (y as f32 * fit.scale).round() as u32 + fit.offset_y;
            let value = if tensor_x < mask_width && tensor_y < mask_height {
                tensor
                    .get([0, 0, tensor_y as usize, tensor_x as usize])
                    .copied()
                    .unwrap_or(0.0)
            } else {
                0.0
            };
            mask.push((value.clamp(0.0, 1.0) * 255.0) as u8);
        }
    }
    Ok(mask)
}

/// Apply a per-pixel alpha mask to an image, producing the transparent
/// foreground
pub(crate) fn apply_alpha(image: &DynamicImage, mask: &[u8]) -> RgbaImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut result = ImageBuffer::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = mask.get((y * width + x) as usize).copied().unwrap_or(0);
        if alpha > 0 {
            result.put_pixel(x, y, Rgba([pixel[0], pixel[1], pixel[2], alpha]));
        } else {
            result.put_pixel(x, y, Rgba([0, 0, 0, 0]));
        }
    }

    result
}
