use log::{debug, error, info, warn};
use crate::config::config::{FaceDetectionConfig, InferenceConfig};
use crate::config::settings::Settings;
use crate::error::errors::{PipelineError, Stage};
use crate::helper::face_helper::FaceLocator;
use crate::models::prediction::PredictionResult;
use crate::modules::emotion_client::{EmotionClient, HttpTransport, InferenceTransport};
use crate::utils::image::{crop, decode_base64_image, resize_to, to_grayscale};
use crate::utils::tensor::{build_tensor, FaceTensor, TENSOR_SHAPE};

/// Photo in, emotion out.
///
/// decode -> grayscale -> locate face -> crop -> resize -> tensor -> forward.
/// The first failing stage ends the run. Holds no per-request state, so one
/// instance can serve concurrent requests behind an `Arc`.
#[derive(Clone)]
pub struct EmotionPipeline<T: InferenceTransport = HttpTransport> {
    face_locator: FaceLocator,
    emotion_client: EmotionClient<T>,
}

impl EmotionPipeline<HttpTransport> {
    /// new_http wires the shared Haar cascade detector to an HTTP model server.
    pub fn new_http(face_detection: &FaceDetectionConfig, inference: &InferenceConfig) -> Result<Self, PipelineError> {
        Ok(EmotionPipeline::new(
            FaceLocator::haar(face_detection),
            EmotionClient::http(inference)?,
        ))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        EmotionPipeline::new_http(&settings.face_detection, &settings.inference)
    }
}

impl<T: InferenceTransport> EmotionPipeline<T> {

    /// new initializes new instance of the pipeline
    pub fn new(face_locator: FaceLocator, emotion_client: EmotionClient<T>) -> Self {
        EmotionPipeline {
            face_locator,
            emotion_client,
        }
    }

    pub fn emotion_client(&self) -> &EmotionClient<T> {
        &self.emotion_client
    }

    /// preprocess turns an encoded photo into the model input tensor.
    ///
    /// Runs on the calling thread; `predict` moves it onto tokio's blocking pool.
    ///
    /// # Arguments
    /// * `base64_image` - base64 text or data URL of a jpeg/png/... photo
    ///
    /// # Returns
    /// * `Result<FaceTensor, PipelineError>` - 48x48x1 on success
    pub fn preprocess(&self, base64_image: &str) -> Result<FaceTensor, PipelineError> {
        preprocess_image(&self.face_locator, base64_image)
    }

    /// predict runs the whole pipeline for one photo.
    ///
    /// Decoding and face detection are CPU bound and run under
    /// `tokio::task::spawn_blocking`, so a tokio runtime must be current.
    /// Failures are logged here once, with their diagnostic, and returned
    /// unchanged. A `Transient` forward error is the only one worth retrying.
    ///
    /// # Arguments
    /// * `base64_image` - base64 text or data URL of a jpeg/png/... photo
    ///
    /// # Returns
    /// * `Result<PredictionResult, PipelineError>`
    pub async fn predict(&self, base64_image: &str) -> Result<PredictionResult, PipelineError> {
        let face_locator = self.face_locator.clone();
        let encoded = base64_image.to_owned();
        let preprocessed = tokio::task::spawn_blocking(move || preprocess_image(&face_locator, &encoded))
            .await
            .unwrap_or_else(|e| Err(PipelineError::internal(Stage::FaceLocate, format!("preprocessing task failed: {e}"))));

        let result = match preprocessed {
            Ok(tensor) => self.emotion_client.infer_single(&tensor).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(prediction) => info!("predicted {} with confidence {:.4}", prediction.emotion, prediction.confidence),
            Err(e) if e.is_user_caused() => warn!("{e}"),
            Err(e) => error!("{e}"),
        }
        result
    }
}

/// Stages 1-6: decode, grayscale, locate, crop, resize, tensor.
fn preprocess_image(face_locator: &FaceLocator, base64_image: &str) -> Result<FaceTensor, PipelineError> {
    let image = decode_base64_image(base64_image)?;
    let gray = to_grayscale(image)?;
    let face = face_locator.locate(&gray)?;
    debug!("selected face {:?} in {}x{} image", face, gray.width(), gray.height());

    let cropped = crop(gray, face)?;
    let resized = resize_to(cropped, (TENSOR_SHAPE[1], TENSOR_SHAPE[0]))?;
    build_tensor(resized)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use ndarray::Array3;
    use opencv::core::{Mat, Scalar, Vec3b, CV_8UC3};
    use opencv::prelude::*;
    use crate::config::config::{FaceDetectionConfig, InferenceConfig};
    use crate::error::errors::{ErrorKind, PipelineError, Stage};
    use crate::helper::face_helper::tests::StubDetector;
    use crate::helper::face_helper::{FaceLocator, HaarCascadeDetector};
    use crate::models::emotion::Emotion;
    use crate::modules::emotion_client::tests::MockTransport;
    use crate::modules::emotion_client::{EmotionClient, PredictResponse};
    use crate::pipeline::pipeline::EmotionPipeline;
    use crate::utils::coordinate::BoundingBox;
    use crate::utils::image::tests::{encode_png_base64, solid_bgr};

    const PREDICT_URL: &str = "http://127.0.0.1:8501/v1/models/emotion:predict";

    fn pipeline(detector: Arc<StubDetector>, transport: MockTransport) -> EmotionPipeline<MockTransport> {
        EmotionPipeline::new(
            FaceLocator::new(detector),
            EmotionClient::new(transport, &InferenceConfig::new(PREDICT_URL)),
        )
    }

    fn photo_base64() -> String {
        let mut mat = solid_bgr(200, 160, 90.0);
        for y in 40..140 {
            for x in 30..130 {
                *mat.at_2d_mut::<Vec3b>(y, x).unwrap() = Vec3b::from([(x % 256) as u8, (y % 256) as u8, 180]);
            }
        }
        encode_png_base64(&mat)
    }

    #[tokio::test]
    async fn test_pipeline_predicts_emotion() {
        let detector = StubDetector::new(vec![
            BoundingBox::new(5, 5, 60, 60),
            BoundingBox::new(30, 40, 100, 100),
        ]);
        let pipeline = pipeline(detector.clone(), MockTransport::returning(vec![0.02, 0.01, 0.05, 0.1, 0.7, 0.1, 0.02]));

        let result = pipeline.predict(&photo_base64()).await.unwrap();
        assert!(Emotion::ALL.contains(&result.emotion));
        assert_eq!(result.emotion, Emotion::Neutral);
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(detector.calls(), 1);

        let transport = pipeline.emotion_client().transport();
        assert_eq!(transport.calls(), 1);
        let request = transport.last_request.lock().unwrap().clone().unwrap();
        let input = &request.instances[0]["input_layer_1"];
        assert_eq!((input.len(), input[0].len(), input[0][0].len()), (48, 48, 1));
    }

    #[test]
    fn test_preprocess_shape() {
        let detector = StubDetector::new(vec![BoundingBox::new(30, 40, 100, 100)]);
        let pipeline = pipeline(detector, MockTransport::returning(vec![0.0; 7]));
        let tensor = pipeline.preprocess(&photo_base64()).unwrap();
        assert_eq!(tensor.shape(), &[48, 48, 1]);
        assert!(tensor.iter().all(|v| (0.0..=255.0).contains(v)));
    }

    #[tokio::test]
    async fn test_pipeline_no_face_skips_network() {
        let detector = StubDetector::new(vec![]);
        let pipeline = pipeline(detector, MockTransport::returning(vec![0.0; 7]));

        let err = pipeline.predict(&photo_base64()).await.unwrap_err();
        assert_eq!(err.stage, Stage::FaceLocate);
        assert_eq!(err.kind, ErrorKind::NoFaceDetected);
        assert_eq!(pipeline.emotion_client().transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_haar_no_face_skips_network() {
        let config = FaceDetectionConfig::new();
        if !Path::new(&config.cascade_path).exists() {
            println!("skipping: cascade not found at {}", config.cascade_path);
            return
        }
        let pipeline = EmotionPipeline::new(
            FaceLocator::new(Arc::new(HaarCascadeDetector::new(config))),
            EmotionClient::new(MockTransport::returning(vec![0.0; 7]), &InferenceConfig::new(PREDICT_URL)),
        );
        let blank = Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::all(0.0)).unwrap();

        let err = pipeline.predict(&encode_png_base64(&blank)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoFaceDetected);
        assert_eq!(pipeline.emotion_client().transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_malformed_input_fails_before_detection() {
        let detector = StubDetector::new(vec![BoundingBox::new(0, 0, 60, 60)]);
        let pipeline = pipeline(detector.clone(), MockTransport::returning(vec![0.0; 7]));

        for input in ["", "   ", "invalid_base64_image", "data:image/jpeg;base64,"] {
            let err = pipeline.predict(input).await.unwrap_err();
            assert_eq!(err.stage, Stage::Decode, "input {input:?}");
            assert_eq!(err.kind, ErrorKind::MalformedInput);
        }
        assert_eq!(detector.calls(), 0);
        assert_eq!(pipeline.emotion_client().transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_rejects_three_channel_tensor_without_network() {
        let detector = StubDetector::new(vec![]);
        let pipeline = pipeline(detector, MockTransport::returning(vec![0.0; 7]));

        let err = pipeline.emotion_client().infer_single(&Array3::<f32>::zeros((48, 48, 3))).await.unwrap_err();
        assert_eq!(err.stage, Stage::Forward);
        assert_eq!(err.kind, ErrorKind::ShapeMismatch);
        assert_eq!(pipeline.emotion_client().transport().calls(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_short_prediction_vector_is_malformed() {
        let detector = StubDetector::new(vec![BoundingBox::new(30, 40, 100, 100)]);
        let pipeline = pipeline(detector, MockTransport::returning(vec![0.1, 0.1, 0.1, 0.4, 0.2, 0.1]));

        let err = pipeline.predict(&photo_base64()).await.unwrap_err();
        assert_eq!(err.stage, Stage::Forward);
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_pipeline_propagates_transient_errors() {
        let detector = StubDetector::new(vec![BoundingBox::new(30, 40, 100, 100)]);
        let transport = MockTransport::with_response(Err(PipelineError::forward(ErrorKind::Transient, "connection reset by peer")));
        let pipeline = pipeline(detector, transport);

        let err = pipeline.predict(&photo_base64()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.diagnostic, "connection reset by peer");
        assert_eq!(pipeline.emotion_client().transport().calls(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_rejects_extra_instances() {
        let detector = StubDetector::new(vec![BoundingBox::new(30, 40, 100, 100)]);
        let transport = MockTransport::with_response(Ok(PredictResponse {
            predictions: vec![vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]],
        }));
        let pipeline = pipeline(detector, transport);

        let err = pipeline.predict(&photo_base64()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_predictions_share_one_pipeline() {
        let detector = StubDetector::new(vec![BoundingBox::new(30, 40, 100, 100)]);
        let pipeline = Arc::new(pipeline(detector.clone(), MockTransport::returning(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0])));
        let photo = photo_base64();

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            let photo = photo.clone();
            async move { pipeline.predict(&photo).await }
        });
        let second = tokio::spawn({
            let pipeline = pipeline.clone();
            let photo = photo.clone();
            async move { pipeline.predict(&photo).await }
        });
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap().unwrap().emotion, Emotion::Sad);
        assert_eq!(second.unwrap().unwrap().emotion, Emotion::Sad);
        assert_eq!(detector.calls(), 2);
        assert_eq!(pipeline.emotion_client().transport().calls(), 2);
    }

    #[test]
    fn test_pipeline_is_shareable() {
        fn assert_send_sync<P: Send + Sync>() {}
        assert_send_sync::<EmotionPipeline<MockTransport>>();
        assert_send_sync::<EmotionPipeline>();
    }
}
