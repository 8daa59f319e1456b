use crate::error::{LoadError, SchemaViolation};
use engine_core::{
    error::{DestinationError, ExtractError, StateStoreError},
    retry::RetryDisposition,
};
use tokio_postgres::error::SqlState;

pub fn classify_load_error(err: &LoadError) -> RetryDisposition {
    match err {
        LoadError::Schema(violation) => classify_schema_violation(violation),
        LoadError::Destination { source, .. } => classify_destination_error(source),
    }
}

pub fn classify_schema_violation(_: &SchemaViolation) -> RetryDisposition {
    RetryDisposition::Stop
}

pub fn classify_extract_error(err: &ExtractError) -> RetryDisposition {
    err.disposition()
}

pub fn classify_destination_error(err: &DestinationError) -> RetryDisposition {
    match err {
        DestinationError::Unavailable(_) => RetryDisposition::Retry,
        DestinationError::Database { code: Some(code), .. } if is_retryable_pg_code(&SqlState::from_code(code)) => {
            RetryDisposition::Retry
        }
        DestinationError::Database { .. }
        | DestinationError::SchemaConflict { .. }
        | DestinationError::MissingTable(_)
        | DestinationError::MissingKey { .. } => RetryDisposition::Stop,
    }
}

/// A conflict means another writer moved the cursor, which breaks the
/// single-flight guarantee; retrying would only race again.
pub fn classify_state_error(err: &StateStoreError) -> RetryDisposition {
    match err {
        StateStoreError::Storage(_) => RetryDisposition::Retry,
        StateStoreError::Codec { .. } | StateStoreError::Conflict { .. } => RetryDisposition::Stop,
    }
}

fn is_retryable_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
            | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
            | SqlState::CONNECTION_EXCEPTION
            | SqlState::QUERY_CANCELED
            | SqlState::OPERATOR_INTERVENTION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(code: &str) -> DestinationError {
        DestinationError::Database {
            code: Some(code.to_string()),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn transient_sqlstates_retry() {
        for code in ["40001", "40P01", "53300", "57P01", "08006"] {
            assert_eq!(classify_destination_error(&db(code)), RetryDisposition::Retry, "{code}");
        }
    }

    #[test]
    fn data_errors_stop() {
        // not_null_violation, undefined_column
        assert_eq!(classify_destination_error(&db("23502")), RetryDisposition::Stop);
        assert_eq!(classify_destination_error(&db("42703")), RetryDisposition::Stop);
        assert_eq!(
            classify_load_error(&LoadError::Schema(SchemaViolation::MissingKey {
                resource: "spend".to_string(),
                column: "date".to_string(),
                index: 0,
            })),
            RetryDisposition::Stop
        );
    }

    #[test]
    fn cursor_conflicts_are_fatal() {
        let conflict = StateStoreError::Conflict {
            key: "cur:a:b:c".to_string(),
            expected: "initial".to_string(),
            found: "row".to_string(),
        };
        assert_eq!(classify_state_error(&conflict), RetryDisposition::Stop);
        assert_eq!(
            classify_state_error(&StateStoreError::Storage("disk".to_string())),
            RetryDisposition::Retry
        );
    }
}
