use ndarray::{Array2, Array3, Axis};
use crate::error::errors::{PipelineError, Stage};
use crate::utils::image::ImageBuffer;

/// Model input tensor, height x width x channel.
pub type FaceTensor = Array3<f32>;

pub const TENSOR_SHAPE: [usize; 3] = [48, 48, 1];

/// build_tensor adds the trailing channel axis to a 48x48 single-channel buffer.
///
/// Pixel values are passed through as-is (0..=255); the served model
/// normalizes in its first layer.
pub fn build_tensor(image: ImageBuffer) -> Result<FaceTensor, PipelineError> {
    let (h, w, c) = (image.height(), image.width(), image.channels());
    if [h, w, c] != TENSOR_SHAPE {
        return Err(PipelineError::internal(
            Stage::Tensor,
            format!("expected a {}x{}x{} image, got {h}x{w}x{c}", TENSOR_SHAPE[0], TENSOR_SHAPE[1], TENSOR_SHAPE[2]),
        ))
    }

    let samples = image.to_bytes().map_err(|e| PipelineError::internal(Stage::Tensor, format!("{e:#}")))?;
    let plane = Array2::from_shape_vec((h, w), samples).map_err(|e| PipelineError::internal(Stage::Tensor, e.to_string()))?;
    Ok(plane.mapv(f32::from).insert_axis(Axis(2)))
}
