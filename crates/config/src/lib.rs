//! Configuration for the home service voice agent
//!
//! Settings are layered: config/default.toml, an optional per-environment
//! file, then environment variables with the HOMESERV prefix.

pub mod settings;

pub use settings::{
    load_settings, ObservabilityConfig, SchedulingConfig, ServerConfig, SessionConfig, Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
