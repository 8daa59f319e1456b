use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Identifier of one pipeline run; every batch written by the run shares it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadId(Arc<str>);

impl LoadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LoadId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a file-drop prefix into a table name (`orders-create/` -> `orders_create`).
pub fn table_name_from_prefix(prefix: &str) -> String {
    prefix
        .replace(['-', '/'], "_")
        .trim_matches('_')
        .to_string()
}

/// Normalizes a CSV header into a column name.
pub fn normalize_col_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}
