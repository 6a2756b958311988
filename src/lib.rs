pub mod utils;
pub mod pipeline;
pub mod config;
pub mod helper;
pub mod error;
pub mod logger;
pub mod models;
pub mod modules;

pub use crate::config::config::{FaceDetectionConfig, InferenceConfig, LoggerConfig};
pub use crate::config::settings::Settings;
pub use crate::error::errors::{ErrorKind, PipelineError, Stage};
pub use crate::models::emotion::Emotion;
pub use crate::models::prediction::PredictionResult;
pub use crate::pipeline::pipeline::EmotionPipeline;
