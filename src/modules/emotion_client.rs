use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use crate::config::config::InferenceConfig;
use crate::error::errors::{ErrorKind, PipelineError};
use crate::models::emotion::Emotion;
use crate::models::prediction::PredictionResult;
use crate::utils::tensor::{FaceTensor, TENSOR_SHAPE};

/// Request envelope of the model server's REST predict API.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictRequest {
    pub instances: Vec<BTreeMap<String, Vec<Vec<Vec<f32>>>>>,
}

impl PredictRequest {
    pub fn single(input_name: &str, tensor: &FaceTensor) -> Self {
        let nested: Vec<Vec<Vec<f32>>> = tensor
            .outer_iter()
            .map(|row| row.outer_iter().map(|pixel| pixel.to_vec()).collect())
            .collect();
        PredictRequest {
            instances: vec![BTreeMap::from([(input_name.to_string(), nested)])],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub predictions: Vec<Vec<f32>>,
}

/// Network seam between the forwarder and the model server.
pub trait InferenceTransport: Send + Sync {
    fn predict(&self, request: &PredictRequest) -> impl Future<Output = Result<PredictResponse, PipelineError>> + Send;
}

/// JSON over HTTP POST with bounded connect and request time.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    predict_url: String,
}

impl HttpTransport {
    pub fn new(config: &InferenceConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .build()
            .map_err(|e| PipelineError::forward(ErrorKind::Internal, format!("failed to build http client: {e}")))?;

        Ok(HttpTransport {
            client,
            predict_url: config.predict_url.to_owned(),
        })
    }
}

fn classify_status(status: StatusCode) -> ErrorKind {
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ErrorKind::Transient
    } else {
        ErrorKind::Rejected
    }
}

fn classify_transport_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_builder() {
        ErrorKind::Internal
    } else {
        ErrorKind::Transient
    }
}

impl InferenceTransport for HttpTransport {
    async fn predict(&self, request: &PredictRequest) -> Result<PredictResponse, PipelineError> {
        let response = self.client
            .post(&self.predict_url)
            .json(request)
            .send()
            .await
            .map_err(|e| PipelineError::forward(classify_transport_error(&e), format!("Error in forward to serving: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::forward(ErrorKind::Transient, format!("Error reading serving response: {e}")))?;

        if !status.is_success() {
            return Err(PipelineError::forward(
                classify_status(status),
                format!("serving responded {status}: {}", String::from_utf8_lossy(&body)),
            ))
        }

        serde_json::from_slice::<PredictResponse>(&body)
            .map_err(|e| PipelineError::forward(ErrorKind::MalformedResponse, format!("invalid serving response body: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct EmotionClient<T: InferenceTransport = HttpTransport> {
    transport: T,
    pub input_name: String,
}

impl EmotionClient<HttpTransport> {
    pub fn http(config: &InferenceConfig) -> Result<Self, PipelineError> {
        Ok(EmotionClient::new(HttpTransport::new(config)?, config))
    }
}

impl<T: InferenceTransport> EmotionClient<T> {
    pub fn new(transport: T, config: &InferenceConfig) -> Self {
        EmotionClient {
            transport,
            input_name: config.input_name.to_owned(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn expected_shape(&self) -> [usize; 3] {
        TENSOR_SHAPE
    }

    /// infer_single forwards one face tensor and returns the most likely emotion.
    ///
    /// The tensor shape is checked before anything goes on the wire. Retrying
    /// is left to the caller; see `PipelineError::is_retryable`.
    ///
    /// # Arguments
    /// * `tensor` - &FaceTensor of shape 48x48x1
    ///
    /// # Returns
    /// * `Result<PredictionResult, PipelineError>`
    pub async fn infer_single(&self, tensor: &FaceTensor) -> Result<PredictionResult, PipelineError> {
        let expected = self.expected_shape();
        if tensor.shape() != expected {
            return Err(PipelineError::forward(
                ErrorKind::ShapeMismatch,
                format!("Unexpected image shape: {:?} - Expected: {:?}", tensor.shape(), expected),
            ))
        }

        let request = PredictRequest::single(&self.input_name, tensor);
        let response = self.transport.predict(&request).await?;
        let result = parse_predictions(response)?;
        debug!("serving predicted {} ({:.4})", result.emotion, result.confidence);
        Ok(result)
    }
}

/// parse_predictions validates the model output and maps it to an emotion.
///
/// Exactly one probability vector of exactly seven finite values in [0, 1] is
/// accepted; longer vectors are rejected rather than truncated.
pub fn parse_predictions(response: PredictResponse) -> Result<PredictionResult, PipelineError> {
    let malformed = |msg: String| PipelineError::forward(ErrorKind::MalformedResponse, msg);

    let mut predictions = response.predictions;
    if predictions.len() != 1 {
        return Err(malformed(format!("expected predictions for 1 instance, got {}", predictions.len())))
    }
    let probabilities = predictions.remove(0);

    if probabilities.len() != Emotion::COUNT {
        return Err(malformed(format!(
            "expected {} probabilities, got {}",
            Emotion::COUNT,
            probabilities.len()
        )))
    }
    if let Some(bad) = probabilities.iter().find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0) {
        return Err(malformed(format!("probability {bad} outside [0, 1]")))
    }

    PredictionResult::from_probabilities(&probabilities)
        .ok_or_else(|| malformed("empty probability vector".to_string()))
}
