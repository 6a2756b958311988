use std::fmt;
use anyhow::{Error, Result};
use log::debug;
use opencv::core::{Mat, Size, Vector, CV_8U};
use opencv::imgcodecs::{imdecode, IMREAD_COLOR};
use opencv::imgproc::{cvt_color, resize, COLOR_BGR2GRAY, INTER_AREA};
use opencv::prelude::*;
use crate::error::errors::{ErrorKind, PipelineError, Stage};
use crate::utils::coordinate::BoundingBox;
use crate::utils::utils::base64_to_bytes;

/// Owned 8-bit image with one (grayscale) or three (BGR) channels.
///
/// Every stage consumes its input buffer and returns a freshly allocated one,
/// so a buffer handed downstream is never written to again.
pub struct ImageBuffer {
    mat: Mat,
}

impl ImageBuffer {
    pub fn from_mat(mat: Mat) -> Result<Self> {
        if mat.empty() || mat.rows() <= 0 || mat.cols() <= 0 {
            return Err(Error::msg("image is empty"))
        }
        if mat.depth() != CV_8U {
            return Err(Error::msg(format!("unsupported sample depth {}, expected 8-bit unsigned", mat.depth())))
        }
        let channels = mat.channels();
        if channels != 1 && channels != 3 {
            return Err(Error::msg(format!("unsupported channel count {channels}, expected 1 or 3")))
        }
        Ok(ImageBuffer { mat })
    }

    pub fn height(&self) -> usize {
        self.mat.rows() as usize
    }

    pub fn width(&self) -> usize {
        self.mat.cols() as usize
    }

    pub fn channels(&self) -> usize {
        self.mat.channels() as usize
    }

    pub fn as_mat(&self) -> &Mat {
        &self.mat
    }

    /// Row-major copy of the samples, channels interleaved.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.mat.is_continuous() {
            return Ok(self.mat.data_bytes()?.to_vec())
        }
        let compact = self.mat.try_clone()?;
        Ok(compact.data_bytes()?.to_vec())
    }
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("height", &self.height())
            .field("width", &self.width())
            .field("channels", &self.channels())
            .finish()
    }
}

/// bytes_to_image decodes a compressed image (jpeg, png, ...) into a 3-channel BGR matrix.
pub fn bytes_to_image(im_bytes: &[u8]) -> Result<Mat> {
    let buffer = Vector::<u8>::from_slice(im_bytes);
    let img = imdecode(&buffer, IMREAD_COLOR)?;
    if img.empty() {
        return Err(Error::msg("image bytes could not be decoded"))
    }
    Ok(img)
}

/// decode_base64_image turns a base64 (or data URL) photo into a 3-channel buffer.
///
/// # Arguments
/// * `encoded` - base64 text, optionally prefixed with `data:<mime>;base64,`
///
/// # Returns
/// * `Result<ImageBuffer, PipelineError>`
pub fn decode_base64_image(encoded: &str) -> Result<ImageBuffer, PipelineError> {
    let wrap = |e: Error| PipelineError::wrap(Stage::Decode, ErrorKind::MalformedInput, "Error in decoding base64 image", e);

    let im_bytes = base64_to_bytes(encoded).map_err(wrap)?;
    let img = bytes_to_image(&im_bytes).and_then(ImageBuffer::from_mat).map_err(wrap)?;
    debug!("decoded image {}x{}x{}", img.height(), img.width(), img.channels());
    Ok(img)
}

/// to_grayscale converts a 3-channel BGR buffer to a single luminance channel.
pub fn to_grayscale(image: ImageBuffer) -> Result<ImageBuffer, PipelineError> {
    if image.channels() != 3 {
        return Err(PipelineError::new(
            Stage::Grayscale,
            ErrorKind::MalformedBuffer,
            format!("Error in greyscaling image: expected 3 channels, got {}", image.channels()),
        ))
    }

    let convert = || -> Result<ImageBuffer> {
        let mut gray = Mat::default();
        cvt_color(image.as_mat(), &mut gray, COLOR_BGR2GRAY, 0)?;
        ImageBuffer::from_mat(gray)
    };
    convert().map_err(|e| PipelineError::wrap(Stage::Grayscale, ErrorKind::MalformedBuffer, "Error in greyscaling image", e))
}

/// crop copies the region under `bbox` into a new buffer of exactly the box size.
///
/// The box must come from a detection on this same buffer; anything outside
/// the image is reported as an internal error.
pub fn crop(image: ImageBuffer, bbox: BoundingBox) -> Result<ImageBuffer, PipelineError> {
    if !bbox.fits_within(image.width() as i32, image.height() as i32) {
        return Err(PipelineError::internal(
            Stage::Crop,
            format!("bounding box {:?} outside image {}x{}", bbox, image.width(), image.height()),
        ))
    }

    let copy_roi = || -> Result<ImageBuffer> {
        let roi = Mat::roi(image.as_mat(), bbox.into())?;
        ImageBuffer::from_mat(roi.try_clone()?)
    };
    copy_roi().map_err(|e| PipelineError::wrap(Stage::Crop, ErrorKind::Internal, "Error in cropping face", e))
}

/// resize_to shrinks (or stretches) a single-channel buffer to `size` (width, height)
/// with area averaging.
pub fn resize_to(image: ImageBuffer, size: (usize, usize)) -> Result<ImageBuffer, PipelineError> {
    if image.channels() != 1 {
        return Err(PipelineError::internal(
            Stage::Resize,
            format!("expected a single-channel image, got {} channels", image.channels()),
        ))
    }

    let scale = || -> Result<ImageBuffer> {
        let mut img_resized = Mat::default();
        resize(
            image.as_mat(),
            &mut img_resized,
            Size::new(size.0 as i32, size.1 as i32),
            0.0,
            0.0,
            INTER_AREA,
        )?;
        ImageBuffer::from_mat(img_resized)
    };
    scale().map_err(|e| PipelineError::wrap(Stage::Resize, ErrorKind::Internal, "Error in resizing image", e))
}
