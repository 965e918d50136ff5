//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Call session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Scheduling engine configuration
    #[serde(default)]
    pub scheduling: SchedulingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.idle_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.idle_timeout_seconds".to_string(),
                message: "idle timeout must be at least 1 second".to_string(),
            });
        }

        if self.scheduling.window_days == 0 || self.scheduling.window_days > 90 {
            return Err(ConfigError::InvalidValue {
                field: "scheduling.window_days".to_string(),
                message: "availability window must be between 1 and 90 days".to_string(),
            });
        }

        if self.scheduling.max_code_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduling.max_code_attempts".to_string(),
                message: "at least one confirmation code attempt is required".to_string(),
            });
        }

        if self.session.max_diagnose_turns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_diagnose_turns".to_string(),
                message: "diagnose phase needs at least one turn".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            // Empty by default, must be configured for production
            cors_origins: Vec::new(),
        }
    }
}

/// Call session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds of inactivity before a session is reaped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// How often the reaper sweeps for idle sessions, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Maximum turns spent in the diagnose phase before forcing scheduling
    #[serde(default = "default_max_diagnose_turns")]
    pub max_diagnose_turns: u32,

    /// Consecutive failed turns in one phase before offering a callback
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_idle_timeout() -> u64 {
    300
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_max_diagnose_turns() -> u32 {
    10
}
fn default_failure_threshold() -> u32 {
    3
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
            sweep_interval_seconds: default_sweep_interval(),
            max_diagnose_turns: default_max_diagnose_turns(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Scheduling engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// SQLite database path, ":memory:" for ephemeral
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Days ahead to search when the caller gives no date range
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Maximum slots read back to the caller per offer
    #[serde(default = "default_max_offered_slots")]
    pub max_offered_slots: usize,

    /// Confirmation code generation attempts before giving up
    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,

    /// Seed demo technicians and slots at startup
    #[serde(default)]
    pub seed_demo_data: bool,
}

fn default_database_path() -> String {
    "data/homeserv.db".to_string()
}
fn default_window_days() -> u32 {
    14
}
fn default_max_offered_slots() -> usize {
    3
}
fn default_max_code_attempts() -> u32 {
    5
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            window_days: default_window_days(),
            max_offered_slots: default_max_offered_slots(),
            max_code_attempts: default_max_code_attempts(),
            seed_demo_data: false,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (HOMESERV_ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("HOMESERV")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.session.idle_timeout_seconds, 300);
        assert_eq!(settings.scheduling.window_days, 14);
        assert_eq!(settings.session.failure_threshold, 3);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.scheduling.window_days = 0;
        assert!(settings.validate().is_err());

        settings.scheduling.window_days = 14;
        assert!(settings.validate().is_ok());

        settings.session.idle_timeout_seconds = 0;
        assert!(settings.validate().is_err());
    }
}
