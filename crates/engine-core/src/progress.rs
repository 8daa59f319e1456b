use crate::{
    error::ProgressError,
    state::{CursorStore, models::CursorEntry},
};
use chrono::{DateTime, Utc};
use model::cursor::{key::CursorKey, marker::Marker};
use serde::Serialize;
use std::sync::Arc;

/// Read-only view of stored cursors for operators; no pipeline is run.
#[derive(Clone)]
pub struct ProgressService {
    pub store: Arc<dyn CursorStore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CursorStatus {
    pub source: String,
    pub resource: String,
    pub partition: String,
    pub marker: Marker,
    pub summary: String,
    pub load_id: String,
    pub updated_at: DateTime<Utc>,
}

impl CursorStatus {
    fn from_entry(key: CursorKey, entry: CursorEntry) -> Self {
        CursorStatus {
            summary: entry.marker.to_string(),
            source: key.source,
            resource: key.resource,
            partition: key.partition,
            marker: entry.marker,
            load_id: entry.load_id,
            updated_at: entry.updated_at,
        }
    }
}

impl ProgressService {
    pub fn new(store: Arc<dyn CursorStore>) -> Self {
        ProgressService { store }
    }

    pub async fn source_status(&self, source: &str) -> Result<Vec<CursorStatus>, ProgressError> {
        let entries = self.store.list(source).await?;
        Ok(entries
            .into_iter()
            .map(|(key, entry)| CursorStatus::from_entry(key, entry))
            .collect())
    }

    /// Forgets a cursor so the next run starts from the resource's initial marker.
    pub async fn reset(&self, key: &CursorKey) -> Result<bool, ProgressError> {
        Ok(self.store.delete(key).await?)
    }
}
