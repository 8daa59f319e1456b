use engine_core::error::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to read env file {path}: {message}")]
    EnvFile { path: String, message: String },

    #[error("Cannot resolve a home directory for the default state directory")]
    NoHomeDir,
}

impl From<SettingsError> for ConfigError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::InvalidValue { key, reason } => ConfigError::InvalidValue { key, reason },
            other => ConfigError::InvalidValue {
                key: "environment".to_string(),
                reason: other.to_string(),
            },
        }
    }
}
