use crate::{error::StateStoreError, state::models::CursorEntry};
use async_trait::async_trait;
use model::cursor::{key::CursorKey, marker::Marker};

pub mod memory;
pub mod models;
pub mod sled_store;

/// Durable map from `(source, resource, partition)` to a progress marker.
///
/// Every write is all-or-nothing: a failed `set` leaves the previous entry
/// readable, which callers treat as "progress not recorded".
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self, key: &CursorKey) -> Result<Option<CursorEntry>, StateStoreError>;

    async fn set(&self, key: &CursorKey, entry: CursorEntry) -> Result<(), StateStoreError>;

    /// Writes `entry` only if the stored marker still equals `expected`
    /// (`None` meaning no entry is stored).
    async fn compare_and_set(
        &self,
        key: &CursorKey,
        expected: Option<&Marker>,
        entry: CursorEntry,
    ) -> Result<(), StateStoreError>;

    /// All entries of one source, ordered by key.
    async fn list(&self, source: &str) -> Result<Vec<(CursorKey, CursorEntry)>, StateStoreError>;

    /// Returns whether an entry existed.
    async fn delete(&self, key: &CursorKey) -> Result<bool, StateStoreError>;

    /// Stored marker, or `initial` for a key never written.
    async fn get(&self, key: &CursorKey, initial: &Marker) -> Result<Marker, StateStoreError> {
        Ok(self
            .load(key)
            .await?
            .map(|entry| entry.marker)
            .unwrap_or_else(|| initial.clone()))
    }
}

pub(crate) fn conflict(key: &CursorKey, expected: Option<&Marker>, found: Option<&Marker>) -> StateStoreError {
    let show = |m: Option<&Marker>| m.map(|m| m.to_string()).unwrap_or_else(|| "nothing".to_string());
    StateStoreError::Conflict {
        key: key.to_string(),
        expected: show(expected),
        found: show(found),
    }
}
