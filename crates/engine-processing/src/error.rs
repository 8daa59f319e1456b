use engine_core::error::DestinationError;
use thiserror::Error;

/// A record that cannot be written without breaking the table's key or type
/// contract. The whole batch it belongs to is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    #[error("Record {index} of '{resource}' has no value for primary-key column '{column}'")]
    MissingKey {
        resource: String,
        column: String,
        index: usize,
    },

    #[error("Record {index} of '{resource}': key column '{column}' value '{value}' is not a valid {data_type}")]
    InvalidKey {
        resource: String,
        column: String,
        value: String,
        data_type: String,
        index: usize,
    },
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    #[error("Failed to write '{table}': {source}")]
    Destination {
        table: String,
        #[source]
        source: DestinationError,
    },
}

impl LoadError {
    pub fn destination(table: &str, source: DestinationError) -> Self {
        LoadError::Destination {
            table: table.to_string(),
            source,
        }
    }
}
