use engine_core::{
    error::{ConfigError, ExtractError, StateStoreError},
    retry::RetryDisposition,
};
use engine_processing::{
    error::LoadError,
    retry::{classify_extract_error, classify_load_error, classify_state_error},
};
use model::summary::LoadSummary;
use std::time::Duration;
use thiserror::Error;

/// Top-level errors of a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unknown source or resource, missing credential, bad options.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Extraction of '{resource}' failed: {source}")]
    Extract {
        resource: String,
        #[source]
        source: ExtractError,
    },

    #[error("Loading '{resource}' failed: {source}")]
    Load {
        resource: String,
        #[source]
        source: LoadError,
    },

    /// The batch was loaded but its marker could not be recorded.
    #[error("Recording progress of '{resource}' failed: {source}")]
    State {
        resource: String,
        #[source]
        source: StateStoreError,
    },

    #[error("Refusing to move cursor {key} back from {stored} to {proposed}")]
    Regression {
        key: String,
        stored: String,
        proposed: String,
    },

    #[error("Run exceeded the {}s time limit", .0.as_secs())]
    Timeout(Duration),

    #[error("Run cancelled")]
    Cancelled,

    /// A resource failed; `summary` records what the run did before that.
    #[error("Run {} of '{}' failed: {source}", .summary.load_id, .summary.source)]
    Failed {
        summary: Box<LoadSummary>,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            PipelineError::Config(_) => RetryDisposition::Stop,
            PipelineError::Extract { source, .. } => classify_extract_error(source),
            PipelineError::Load { source, .. } => classify_load_error(source),
            PipelineError::State { source, .. } => classify_state_error(source),
            PipelineError::Regression { .. } => RetryDisposition::Stop,
            PipelineError::Timeout(_) => RetryDisposition::Retry,
            PipelineError::Cancelled => RetryDisposition::Stop,
            PipelineError::Failed { source, .. } => source.disposition(),
        }
    }

    /// Fatal errors need an operator; everything else is worth retrying.
    pub fn is_fatal(&self) -> bool {
        self.disposition() == RetryDisposition::Stop
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            PipelineError::Cancelled => true,
            PipelineError::Failed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Summary of the failed run, when the failure happened after it started.
    pub fn summary(&self) -> Option<&LoadSummary> {
        match self {
            PipelineError::Failed { summary, .. } => Some(summary),
            _ => None,
        }
    }

    /// The error that caused the run to fail, without the summary wrapper.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Failed { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::error::DestinationError;
    use engine_processing::error::SchemaViolation;
    use model::core::identifiers::LoadId;

    #[test]
    fn unknown_source_is_fatal() {
        let err = PipelineError::from(ConfigError::UnknownSource("doesnotexist".into()));
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Unknown source 'doesnotexist'");
    }

    #[test]
    fn destination_outage_is_transient() {
        let err = PipelineError::Load {
            resource: "daily_spend".into(),
            source: LoadError::destination(
                "redtrack_daily_spend",
                DestinationError::Unavailable("connection reset".into()),
            ),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn schema_violation_is_fatal() {
        let err = PipelineError::Load {
            resource: "orders".into(),
            source: LoadError::Schema(SchemaViolation::MissingKey {
                resource: "orders".into(),
                column: "row_id".into(),
                index: 3,
            }),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn failed_run_keeps_inner_classification() {
        let summary = LoadSummary::new(LoadId::new("l1"), "redtrack", "713", false);
        let err = PipelineError::Failed {
            summary: Box::new(summary),
            source: Box::new(PipelineError::Extract {
                resource: "daily_spend".into(),
                source: ExtractError::RateLimited {
                    source_name: "redtrack".into(),
                    retry_after: None,
                },
            }),
        };
        assert_eq!(
            err.disposition(),
            RetryDisposition::Throttled { retry_after: None }
        );
        assert!(matches!(err.root(), PipelineError::Extract { .. }));
        assert_eq!(err.summary().map(|s| s.source.as_str()), Some("redtrack"));
    }

    #[test]
    fn timeout_is_retried() {
        assert!(!PipelineError::Timeout(Duration::from_secs(1800)).is_fatal());
        assert!(PipelineError::Cancelled.is_fatal());
    }
}
