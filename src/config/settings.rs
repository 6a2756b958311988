use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use crate::config::config::{FaceDetectionConfig, InferenceConfig, LoggerConfig};

/// Settings for processes embedding the pipeline.
///
/// Nothing in the pipeline reads these by itself; the embedding process loads
/// them and hands the pieces to the constructors.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub face_detection: FaceDetectionConfig,
    pub inference: InferenceConfig,
    #[serde(default)]
    pub logger: LoggerConfig,
}

impl Settings {
    /// load reads a TOML file, then overlays `EMOTION__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("EMOTION").prefix_separator("__").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
