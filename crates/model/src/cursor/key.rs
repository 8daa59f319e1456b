use serde::{Deserialize, Serialize};
use std::fmt;

/// Addresses one progress marker: a resource of a source, for one partition
/// (typically the client the data is loaded for).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CursorKey {
    pub source: String,
    pub resource: String,
    pub partition: String,
}

impl CursorKey {
    pub fn new(source: &str, resource: &str, partition: &str) -> Self {
        CursorKey {
            source: source.to_string(),
            resource: resource.to_string(),
            partition: partition.to_string(),
        }
    }

    /// Key under which the marker is persisted.
    pub fn storage_key(&self) -> String {
        format!("cur:{}:{}:{}", self.source, self.resource, self.partition)
    }

    /// Prefix matching every marker of a source.
    pub fn source_prefix(source: &str) -> String {
        format!("cur:{source}:")
    }
}

impl fmt::Display for CursorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source, self.resource, self.partition)
    }
}
