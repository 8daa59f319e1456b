use engine_core::error::ExtractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV parsing error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

impl From<FileError> for ExtractError {
    /// Unreadable files may be transient (network mounts); malformed CSV is not.
    fn from(err: FileError) -> Self {
        match &err {
            FileError::NotFound(path) | FileError::Io { path, .. } => ExtractError::io(path, &err),
            FileError::Csv { path, source } if source.is_io_error() => ExtractError::io(path, &err),
            FileError::Csv { .. } => ExtractError::Decode(err.to_string()),
        }
    }
}
