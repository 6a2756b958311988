use std::sync::{Arc, Mutex};
use anyhow::{Error, Result};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use opencv::core::{Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use crate::config::config::FaceDetectionConfig;
use crate::error::errors::{ErrorKind, PipelineError, Stage};
use crate::utils::coordinate::BoundingBox;
use crate::utils::image::ImageBuffer;

/// Source of candidate face boxes for a grayscale image.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, gray: &ImageBuffer) -> Result<Vec<BoundingBox>, PipelineError>;
}

/// Viola-Jones Haar cascade detector backed by OpenCV.
///
/// OpenCV's `detect_multi_scale` takes `&mut self`, so each detection checks a
/// classifier out of an idle pool and returns it afterwards. The lock only
/// guards the pool; detections run in parallel. The pool grows to the peak
/// number of concurrent detections, each entry parsed from `cascade_path` once.
pub struct HaarCascadeDetector {
    config: FaceDetectionConfig,
    idle: Mutex<Vec<CascadeClassifier>>,
}

static SHARED_DETECTOR: OnceCell<Arc<HaarCascadeDetector>> = OnceCell::new();

impl HaarCascadeDetector {
    pub fn new(config: FaceDetectionConfig) -> Self {
        HaarCascadeDetector {
            config,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// shared returns the process-wide detector, creating it from `config` on first call.
    ///
    /// Later calls get the same instance; a differing config is reported and ignored.
    pub fn shared(config: &FaceDetectionConfig) -> Arc<HaarCascadeDetector> {
        let detector = SHARED_DETECTOR
            .get_or_init(|| Arc::new(HaarCascadeDetector::new(config.clone())))
            .clone();
        if detector.config() != config {
            warn!(
                "face detector already initialized with {:?}, ignoring {:?}",
                detector.config(),
                config
            );
        }
        detector
    }

    pub fn config(&self) -> &FaceDetectionConfig {
        &self.config
    }

    /// idle_classifiers is the number of loaded classifiers waiting in the pool.
    pub fn idle_classifiers(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    fn checkout(&self) -> Result<CascadeClassifier, PipelineError> {
        if let Some(classifier) = self.idle.lock().ok().and_then(|mut idle| idle.pop()) {
            return Ok(classifier)
        }
        load_classifier(&self.config.cascade_path)
            .map_err(|e| PipelineError::classifier_unavailable(format!("Failed to load haarcascade: {e:#}")))
    }

    fn checkin(&self, classifier: CascadeClassifier) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(classifier);
        }
    }
}

/// load_classifier reads a cascade XML file, failing if OpenCV ends up with an empty classifier.
pub fn load_classifier(path: &str) -> Result<CascadeClassifier> {
    let classifier = CascadeClassifier::new(path)?;
    if classifier.empty()? {
        return Err(Error::msg(format!("cascade file {path} is missing or invalid")))
    }
    info!("loaded face cascade from {path}");
    Ok(classifier)
}

impl FaceDetector for HaarCascadeDetector {
    fn detect(&self, gray: &ImageBuffer) -> Result<Vec<BoundingBox>, PipelineError> {
        if gray.channels() != 1 {
            return Err(PipelineError::internal(
                Stage::FaceLocate,
                format!("face detection expects a grayscale image, got {} channels", gray.channels()),
            ))
        }

        let mut classifier = self.checkout()?;
        let mut faces = Vector::<Rect>::new();
        let detected = classifier.detect_multi_scale(
            gray.as_mat(),
            &mut faces,
            self.config.scale_factor,
            self.config.min_neighbors,
            0,
            Size::new(self.config.min_size.0, self.config.min_size.1),
            Size::default(),
        );
        self.checkin(classifier);

        detected.map_err(|e| PipelineError::wrap(
            Stage::FaceLocate,
            ErrorKind::Internal,
            "Error in detecting and cropping face",
            Error::from(e),
        ))?;

        Ok(faces.iter().map(BoundingBox::from).collect())
    }
}

/// select_largest_face returns the candidate with the largest area.
///
/// Haar cascades over-detect on background clutter; the real face is usually
/// the dominant region. Equal areas keep the earliest candidate.
pub fn select_largest_face(candidates: &[BoundingBox]) -> Option<BoundingBox> {
    let mut largest: Option<BoundingBox> = None;
    for candidate in candidates {
        match largest {
            Some(current) if current.area() >= candidate.area() => {}
            _ => largest = Some(*candidate),
        }
    }
    largest
}

#[derive(Clone)]
pub struct FaceLocator {
    detector: Arc<dyn FaceDetector>,
}

impl FaceLocator {
    pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
        FaceLocator { detector }
    }

    /// haar builds a locator on the process-wide Haar cascade detector.
    pub fn haar(config: &FaceDetectionConfig) -> Self {
        FaceLocator::new(HaarCascadeDetector::shared(config))
    }

    /// locate returns the single face box to crop from `gray`.
    ///
    /// # Arguments
    /// * `gray` - single-channel image
    ///
    /// # Returns
    /// * `Result<BoundingBox, PipelineError>`
    pub fn locate(&self, gray: &ImageBuffer) -> Result<BoundingBox, PipelineError> {
        let candidates = self.detector.detect(gray)?;
        debug!("face detector returned {} candidate(s)", candidates.len());

        let face = match candidates.len() {
            0 => None,
            1 => Some(candidates[0]),
            _ => select_largest_face(&candidates),
        };

        match face {
            Some(face) => Ok(face),
            None => {
                debug!("no face detected in {}x{} image", gray.width(), gray.height());
                Err(PipelineError::no_face())
            }
        }
    }
}
