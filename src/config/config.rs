use serde::{Deserialize, Serialize};

pub const DEFAULT_CASCADE_PATH: &str = "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaceDetectionConfig {
    pub cascade_path: String,
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub min_size: (i32, i32),
}

impl FaceDetectionConfig {
    pub fn new() -> Self {
        FaceDetectionConfig {
            cascade_path: DEFAULT_CASCADE_PATH.to_string(),
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: (60, 60),
        }
    }

    pub fn with_cascade_path(cascade_path: impl Into<String>) -> Self {
        FaceDetectionConfig {
            cascade_path: cascade_path.into(),
            ..FaceDetectionConfig::new()
        }
    }
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        FaceDetectionConfig::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceConfig {
    pub predict_url: String,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

fn default_input_name() -> String {
    "input_layer_1".to_string()
}

fn default_timeout() -> u64 {
    20
}

fn default_connect_timeout() -> u64 {
    5
}

impl InferenceConfig {
    pub fn new(predict_url: impl Into<String>) -> Self {
        InferenceConfig {
            predict_url: predict_url.into(),
            input_name: default_input_name(),
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggerConfig {
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig { level: "info".to_string() }
    }
}
