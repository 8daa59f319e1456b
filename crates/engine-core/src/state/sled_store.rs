use crate::{
    error::StateStoreError,
    state::{CursorStore, conflict, models::CursorEntry},
};
use async_trait::async_trait;
use model::cursor::{key::CursorKey, marker::Marker};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

pub struct SledCursorStore {
    db: sled::Db,
}

enum CasAbort {
    Codec(String),
    Mismatch(Option<Marker>),
}

impl SledCursorStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<CursorEntry, StateStoreError> {
        bincode::deserialize(bytes).map_err(|e| StateStoreError::Codec {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    fn encode(key: &str, entry: &CursorEntry) -> Result<Vec<u8>, StateStoreError> {
        bincode::serialize(entry).map_err(|e| StateStoreError::Codec {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Parses `cur:{source}:{resource}:{partition}` back into a key.
    fn parse_key(raw: &[u8]) -> Option<CursorKey> {
        let text = std::str::from_utf8(raw).ok()?;
        let mut parts = text.strip_prefix("cur:")?.splitn(3, ':');
        Some(CursorKey::new(parts.next()?, parts.next()?, parts.next()?))
    }
}

#[async_trait]
impl CursorStore for SledCursorStore {
    async fn load(&self, key: &CursorKey) -> Result<Option<CursorEntry>, StateStoreError> {
        let storage_key = key.storage_key();
        match self.db.get(&storage_key)? {
            Some(bytes) => Ok(Some(Self::decode(&storage_key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &CursorKey, entry: CursorEntry) -> Result<(), StateStoreError> {
        let storage_key = key.storage_key();
        let bytes = Self::encode(&storage_key, &entry)?;
        self.db.insert(storage_key.as_bytes(), bytes)?;
        self.db.flush_async().await?;
        debug!(cursor = %key, marker = %entry.marker, "Cursor stored");
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &CursorKey,
        expected: Option<&Marker>,
        entry: CursorEntry,
    ) -> Result<(), StateStoreError> {
        let storage_key = key.storage_key();
        let new_bytes = Self::encode(&storage_key, &entry)?;

        // Check-then-set inside one transaction so two writers cannot both
        // advance from the same base.
        let result = self.db.transaction::<_, _, CasAbort>(|tx_db| {
            let current = match tx_db.get(storage_key.as_bytes())? {
                Some(bytes) => Some(
                    bincode::deserialize::<CursorEntry>(&bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(CasAbort::Codec(e.to_string())))?
                        .marker,
                ),
                None => None,
            };

            if current.as_ref() != expected {
                return Err(ConflictableTransactionError::Abort(CasAbort::Mismatch(current)));
            }

            tx_db.insert(storage_key.as_bytes(), new_bytes.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => {
                self.db.flush_async().await?;
                debug!(cursor = %key, marker = %entry.marker, "Cursor advanced");
                Ok(())
            }
            Err(TransactionError::Abort(CasAbort::Mismatch(found))) => {
                Err(conflict(key, expected, found.as_ref()))
            }
            Err(TransactionError::Abort(CasAbort::Codec(message))) => Err(StateStoreError::Codec {
                key: storage_key,
                message,
            }),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    async fn list(&self, source: &str) -> Result<Vec<(CursorKey, CursorEntry)>, StateStoreError> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(CursorKey::source_prefix(source)) {
            let (raw_key, value) = item?;
            let Some(key) = Self::parse_key(&raw_key) else {
                continue;
            };
            let entry = Self::decode(&key.storage_key(), &value)?;
            entries.push((key, entry));
        }
        Ok(entries)
    }

    async fn delete(&self, key: &CursorKey) -> Result<bool, StateStoreError> {
        let removed = self.db.remove(key.storage_key())?.is_some();
        self.db.flush_async().await?;
        Ok(removed)
    }
}
