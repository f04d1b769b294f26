use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid frame rate: {0}")]
    InvalidFrameRate(f64),
    #[error("failed to open video: {0}")]
    Open(String),
    #[error("video contains no frames: {0}")]
    EmptyVideo(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("mask does not match frame shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("unsupported configuration: {0}")]
    Unsupported(&'static str),
    #[cfg(feature = "vision")]
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
    #[cfg(feature = "person-detector")]
    #[error("person detector failed: {0}")]
    Detector(String),
}
