//! Static description of a data source and the tables it feeds.

use crate::{
    core::{data_type::DataType, value::Value},
    cursor::marker::{BatchMarker, Marker, RowMarker},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of records allowed to share one row-cursor value before the
/// resource should move to batch-level tracking.
pub const DEFAULT_MAX_TIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteDisposition {
    Append,
    Merge,
    Replace,
}

impl fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteDisposition::Append => f.write_str("append"),
            WriteDisposition::Merge => f.write_str("merge"),
            WriteDisposition::Replace => f.write_str("replace"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CursorStrategy {
    /// The resource is re-read in full on every run.
    None,

    /// Track the maximum value of `field` plus the keys loaded at that value.
    Row {
        field: String,
        initial: Value,
        max_ties: usize,
    },

    /// Track completed batches (files) by their ordering key.
    Batch { initial: Option<String> },
}

impl CursorStrategy {
    pub fn row(field: &str, initial: impl Into<Value>) -> Self {
        CursorStrategy::Row {
            field: field.to_string(),
            initial: initial.into(),
            max_ties: DEFAULT_MAX_TIES,
        }
    }

    /// Marker returned for a resource that has never been loaded.
    pub fn initial_marker(&self) -> Marker {
        match self {
            CursorStrategy::None => Marker::Initial,
            CursorStrategy::Row { initial, .. } if initial.is_null() => Marker::Initial,
            CursorStrategy::Row { initial, .. } => Marker::Row(RowMarker::new(initial.clone())),
            CursorStrategy::Batch { initial: Some(key) } => Marker::Batch(BatchMarker::new(key)),
            CursorStrategy::Batch { initial: None } => Marker::Initial,
        }
    }

    pub fn is_incremental(&self) -> bool {
        !matches!(self, CursorStrategy::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionKind {
    ApiPaginated,
    FileListing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoercionPolicy {
    /// Parse declared columns into their declared types.
    #[default]
    Coerce,
    /// Leave values as extracted; only tagging and key checks apply.
    KeepText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub name: String,
    pub table: String,
    pub primary_key: Vec<String>,
    pub disposition: WriteDisposition,
    pub cursor: CursorStrategy,
    pub extraction: ExtractionKind,
    pub columns: Vec<ColumnSchema>,
    pub coercion: CoercionPolicy,
}

impl ResourceDescriptor {
    /// A resource named `name` loading into a table of the same name, appended,
    /// without cursor. Adjust with the builder methods.
    pub fn new(name: &str, extraction: ExtractionKind) -> Self {
        ResourceDescriptor {
            name: name.to_string(),
            table: name.to_string(),
            primary_key: Vec::new(),
            disposition: WriteDisposition::Append,
            cursor: CursorStrategy::None,
            extraction,
            columns: Vec::new(),
            coercion: CoercionPolicy::default(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn disposition(mut self, disposition: WriteDisposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn cursor(mut self, cursor: CursorStrategy) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn column(mut self, name: &str, data_type: DataType) -> Self {
        self.columns.push(ColumnSchema {
            name: name.to_string(),
            data_type,
        });
        self
    }

    pub fn coercion(mut self, policy: CoercionPolicy) -> Self {
        self.coercion = policy;
        self
    }

    pub fn declared_type(&self, column: &str) -> Option<&DataType> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| &c.data_type)
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|k| k == column)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.disposition == WriteDisposition::Merge && self.primary_key.is_empty() {
            return Err(DescriptorError::MergeWithoutKey(self.name.clone()));
        }
        match &self.cursor {
            CursorStrategy::Row { field, max_ties, .. } => {
                if field.is_empty() {
                    return Err(DescriptorError::EmptyCursorField(self.name.clone()));
                }
                if *max_ties == 0 {
                    return Err(DescriptorError::ZeroTieBound(self.name.clone()));
                }
                if self.primary_key.is_empty() {
                    return Err(DescriptorError::RowCursorWithoutKey(self.name.clone()));
                }
            }
            CursorStrategy::Batch { .. } if self.extraction != ExtractionKind::FileListing => {
                return Err(DescriptorError::BatchCursorOnApi(self.name.clone()));
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub resources: Vec<ResourceDescriptor>,
}

impl SourceDescriptor {
    pub fn new(name: &str, resources: Vec<ResourceDescriptor>) -> Self {
        SourceDescriptor {
            name: name.to_string(),
            resources,
        }
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        self.resources.iter().try_for_each(ResourceDescriptor::validate)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("resource '{0}' uses merge disposition but declares no primary key")]
    MergeWithoutKey(String),

    #[error("resource '{0}' declares a row cursor without a field")]
    EmptyCursorField(String),

    #[error("resource '{0}' declares a row cursor with a tie bound of zero")]
    ZeroTieBound(String),

    #[error("resource '{0}' declares a row cursor but no primary key to break ties")]
    RowCursorWithoutKey(String),

    #[error("resource '{0}' declares a batch cursor but is not extracted from a file listing")]
    BatchCursorOnApi(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_requires_key() {
        let resource = ResourceDescriptor::new("spend", ExtractionKind::ApiPaginated)
            .disposition(WriteDisposition::Merge);
        assert_eq!(
            resource.validate(),
            Err(DescriptorError::MergeWithoutKey("spend".to_string()))
        );
    }

    #[test]
    fn batch_cursor_only_for_file_listings() {
        let resource = ResourceDescriptor::new("events", ExtractionKind::ApiPaginated)
            .cursor(CursorStrategy::Batch { initial: None });
        assert!(matches!(
            resource.validate(),
            Err(DescriptorError::BatchCursorOnApi(_))
        ));
    }

    #[test]
    fn initial_markers() {
        assert_eq!(CursorStrategy::None.initial_marker(), Marker::Initial);
        assert_eq!(
            CursorStrategy::row("date", "2025-12-20").initial_marker(),
            Marker::Row(RowMarker::new(Value::from("2025-12-20")))
        );
        assert_eq!(
            CursorStrategy::Batch {
                initial: Some("2025-12-18".to_string())
            }
            .initial_marker(),
            Marker::Batch(BatchMarker::new("2025-12-18"))
        );
    }

    #[test]
    fn looks_up_resources() {
        let source = SourceDescriptor::new(
            "posthog",
            vec![
                ResourceDescriptor::new("events", ExtractionKind::ApiPaginated),
                ResourceDescriptor::new("feature_flags", ExtractionKind::ApiPaginated),
            ],
        );
        assert!(source.resource("events").is_some());
        assert!(source.resource("missing").is_none());
        assert_eq!(source.resource_names(), vec!["events", "feature_flags"]);
    }
}
