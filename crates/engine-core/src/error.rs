use crate::retry::RetryDisposition;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Cursor storage failure: {0}")]
    Storage(String),

    #[error("Failed to decode cursor entry for {key}: {message}")]
    Codec { key: String, message: String },

    /// The stored marker no longer matches the one the writer started from.
    #[error("Cursor {key} was modified concurrently (expected {expected}, found {found})")]
    Conflict {
        key: String,
        expected: String,
        found: String,
    },
}

impl From<sled::Error> for StateStoreError {
    fn from(err: sled::Error) -> Self {
        StateStoreError::Storage(err.to_string())
    }
}

/// Problems with what the operator asked for or configured. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown source '{0}'")]
    UnknownSource(String),

    #[error("Source '{source_name}' has no resource named '{resource}'")]
    UnknownResource {
        source_name: String,
        resource: String,
    },

    #[error("Source '{source_name}' requires '{field}' to be set")]
    MissingCredential { source_name: String, field: String },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid run options: {0}")]
    InvalidOptions(String),

    #[error("Invalid descriptor: {0}")]
    Descriptor(String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Authentication rejected by {source_name}: {message}")]
    Auth {
        source_name: String,
        message: String,
    },

    #[error("Rate limited by {source_name}")]
    RateLimited {
        source_name: String,
        retry_after: Option<Duration>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Failed to decode upstream payload: {0}")]
    Decode(String),

    #[error("I/O error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ExtractError {
    /// Authentication, configuration and malformed payloads are fatal; rate
    /// limits back off longer than plain network failures.
    pub fn disposition(&self) -> RetryDisposition {
        match self {
            ExtractError::RateLimited { retry_after, .. } => RetryDisposition::Throttled {
                retry_after: *retry_after,
            },
            ExtractError::Network(_) => RetryDisposition::Retry,
            ExtractError::Upstream { status, .. } if *status == 408 || *status >= 500 => {
                RetryDisposition::Retry
            }
            ExtractError::Io { .. } => RetryDisposition::Retry,
            ExtractError::Auth { .. }
            | ExtractError::Upstream { .. }
            | ExtractError::Decode(_)
            | ExtractError::Config(_) => RetryDisposition::Stop,
        }
    }

    pub fn io(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        ExtractError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DestinationError {
    #[error("Destination unavailable: {0}")]
    Unavailable(String),

    #[error("Database error ({}): {message}", .code.as_deref().unwrap_or("no sqlstate"))]
    Database {
        code: Option<String>,
        message: String,
    },

    #[error("Column '{column}' of '{table}' is {existing}; refusing to change it to {incoming}")]
    SchemaConflict {
        table: String,
        column: String,
        existing: String,
        incoming: String,
    },

    #[error("Table '{0}' does not exist")]
    MissingTable(String),

    #[error("Table '{table}' has no primary key to upsert on")]
    MissingKey { table: String },
}

impl DestinationError {
    /// Coarse classification; SQLSTATE-aware refinement lives with the loader.
    pub fn is_transient(&self) -> bool {
        matches!(self, DestinationError::Unavailable(_))
    }
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Failed to read cursors: {0}")]
    Store(#[from] StateStoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_extract_errors() {
        let auth = ExtractError::Auth {
            source_name: "everflow".into(),
            message: "401".into(),
        };
        assert_eq!(auth.disposition(), RetryDisposition::Stop);

        let limited = ExtractError::RateLimited {
            source_name: "redtrack".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(
            limited.disposition(),
            RetryDisposition::Throttled {
                retry_after: Some(Duration::from_secs(3))
            }
        );

        let server = ExtractError::Upstream {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(server.disposition(), RetryDisposition::Retry);

        let client = ExtractError::Upstream {
            status: 404,
            message: "missing".into(),
        };
        assert_eq!(client.disposition(), RetryDisposition::Stop);
    }

    #[test]
    fn missing_credential_names_source_and_field() {
        let err = ConfigError::MissingCredential {
            source_name: "posthog".into(),
            field: "POSTHOG_API_KEY".into(),
        };
        assert_eq!(
            err.to_string(),
            "Source 'posthog' requires 'POSTHOG_API_KEY' to be set"
        );
    }
}
