use crate::shutdown::ExitCode;
use engine_config::error::SettingsError;
use engine_core::error::{ConfigError, DestinationError, ProgressError, StateStoreError};
use engine_runtime::error::PipelineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load settings: {0}")]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open the cursor store: {0}")]
    State(#[from] StateStoreError),

    #[error("Failed to read cursors: {0}")]
    Progress(#[from] ProgressError),

    #[error("Failed to connect to the destination: {0}")]
    Destination(#[from] DestinationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{failed} of {total} sources failed")]
    Sync {
        failed: usize,
        total: usize,
        fatal: bool,
        cancelled: bool,
    },

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),
}

impl CliError {
    /// Fatal failures need an operator; transient ones are worth a later retry.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Pipeline(err) if err.is_cancelled() => ExitCode::Interrupted,
            CliError::Pipeline(err) if err.is_fatal() => ExitCode::Fatal,
            CliError::Pipeline(_) => ExitCode::Transient,
            CliError::Sync { cancelled: true, .. } => ExitCode::Interrupted,
            CliError::Sync { fatal: true, .. } => ExitCode::Fatal,
            CliError::Sync { .. } => ExitCode::Transient,
            CliError::Destination(err) if err.is_transient() => ExitCode::Transient,
            CliError::State(StateStoreError::Storage(_)) | CliError::Progress(_) => ExitCode::Transient,
            CliError::Settings(_)
            | CliError::Config(_)
            | CliError::State(_)
            | CliError::Destination(_)
            | CliError::JsonSerialize(_) => ExitCode::Fatal,
        }
    }
}
