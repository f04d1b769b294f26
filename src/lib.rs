pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod storage;

#[cfg(feature = "vision")]
pub mod analytics;

pub use config::{Config, ConfigError};
pub use engine::{ActivityEngine, EngineConfig};
pub use error::EngineError;
pub use storage::{ActivityEvent, ActivityLog, ActivityReport};
