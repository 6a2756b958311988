use std::fmt;
use serde::Serialize;

pub const GENERIC_USER_MESSAGE: &str = "An error occurred while processing the image. Please try again.";
pub const NO_FACE_USER_MESSAGE: &str = "No face detected, please ensure you are facing the camera and face is unobstructed";

/// Pipeline stage an error originated from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Decode,
    Grayscale,
    FaceLocate,
    Crop,
    Resize,
    Tensor,
    Forward,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decode => "decode",
            Stage::Grayscale => "grayscale",
            Stage::FaceLocate => "face_locate",
            Stage::Crop => "crop",
            Stage::Resize => "resize",
            Stage::Tensor => "tensor",
            Stage::Forward => "forward",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Empty, non-base64 or undecodable image payload.
    MalformedInput,
    /// Buffer with the wrong channel layout for the stage.
    MalformedBuffer,
    NoFaceDetected,
    /// Cascade data missing or corrupt.
    ClassifierUnavailable,
    /// Broken internal invariant between stages.
    Internal,
    ShapeMismatch,
    /// Network failure, timeout or overloaded service. The only retryable kind.
    Transient,
    /// Service answered with a non-success status that retrying will not fix.
    Rejected,
    MalformedResponse,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::NoFaceDetected => NO_FACE_USER_MESSAGE,
            _ => GENERIC_USER_MESSAGE,
        }
    }
}

/// Error returned by every pipeline stage.
///
/// `user_message` is safe to show to end users. `diagnostic` carries the
/// underlying failure text and is meant for logs only.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{stage} stage failed ({kind:?}): {diagnostic}")]
pub struct PipelineError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub user_message: String,
    pub diagnostic: String,
}

impl PipelineError {
    pub fn new(stage: Stage, kind: ErrorKind, diagnostic: impl Into<String>) -> Self {
        PipelineError {
            stage,
            kind,
            user_message: kind.user_message().to_string(),
            diagnostic: diagnostic.into(),
        }
    }

    /// Wraps a lower-level failure, keeping its full context chain as the diagnostic.
    pub fn wrap(stage: Stage, kind: ErrorKind, context: &str, err: anyhow::Error) -> Self {
        PipelineError::new(stage, kind, format!("{context}: {err:#}"))
    }

    pub fn decode(diagnostic: impl Into<String>) -> Self {
        PipelineError::new(Stage::Decode, ErrorKind::MalformedInput, diagnostic)
    }

    pub fn no_face() -> Self {
        PipelineError::new(Stage::FaceLocate, ErrorKind::NoFaceDetected, "No face detected")
    }

    pub fn classifier_unavailable(diagnostic: impl Into<String>) -> Self {
        PipelineError::new(Stage::FaceLocate, ErrorKind::ClassifierUnavailable, diagnostic)
    }

    pub fn internal(stage: Stage, diagnostic: impl Into<String>) -> Self {
        PipelineError::new(stage, ErrorKind::Internal, diagnostic)
    }

    pub fn forward(kind: ErrorKind, diagnostic: impl Into<String>) -> Self {
        PipelineError::new(Stage::Forward, kind, diagnostic)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Failures caused by the submitted photo rather than by the service.
    pub fn is_user_caused(&self) -> bool {
        matches!(self.kind, ErrorKind::MalformedInput | ErrorKind::NoFaceDetected)
    }
}
