use crate::{
    error::StateStoreError,
    state::{CursorStore, conflict, models::CursorEntry},
};
use async_trait::async_trait;
use model::cursor::{key::CursorKey, marker::Marker};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Process-local cursor store for tests and dry runs.
#[derive(Default)]
pub struct MemoryCursorStore {
    entries: Mutex<BTreeMap<CursorKey, CursorEntry>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, key: &CursorKey) -> Result<Option<CursorEntry>, StateStoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &CursorKey, entry: CursorEntry) -> Result<(), StateStoreError> {
        self.entries.lock().await.insert(key.clone(), entry);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &CursorKey,
        expected: Option<&Marker>,
        entry: CursorEntry,
    ) -> Result<(), StateStoreError> {
        let mut entries = self.entries.lock().await;
        let current = entries.get(key).map(|e| &e.marker);
        if current != expected {
            return Err(conflict(key, expected, current));
        }
        entries.insert(key.clone(), entry);
        Ok(())
    }

    async fn list(&self, source: &str) -> Result<Vec<(CursorKey, CursorEntry)>, StateStoreError> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|(key, _)| key.source == source)
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect())
    }

    async fn delete(&self, key: &CursorKey) -> Result<bool, StateStoreError> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::cursor::marker::BatchMarker;

    #[tokio::test]
    async fn compare_and_set_tracks_current_marker() {
        let store = MemoryCursorStore::new();
        let key = CursorKey::new("file_drop", "orders", "default");
        let first = Marker::Batch(BatchMarker::new("2025-01-01"));
        let second = Marker::Batch(BatchMarker::new("2025-01-02"));

        store
            .compare_and_set(&key, None, CursorEntry::new(first.clone(), "a"))
            .await
            .unwrap();
        let err = store
            .compare_and_set(&key, Some(&second), CursorEntry::new(second.clone(), "b"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("modified concurrently"));

        store
            .compare_and_set(&key, Some(&first), CursorEntry::new(second.clone(), "b"))
            .await
            .unwrap();
        assert_eq!(store.get(&key, &Marker::Initial).await.unwrap(), second);
    }
}
