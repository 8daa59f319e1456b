//! In-process collaborators for scenario tests.

use async_trait::async_trait;
use connectors::incremental::row::RowTracker;
use engine_core::{
    error::{ConfigError, ExtractError, StateStoreError},
    source::{ExtractRequest, Extractor, Source, StaticExtractor},
    state::{CursorStore, models::CursorEntry},
};
use model::{
    core::value::Value,
    cursor::{key::CursorKey, marker::Marker},
    records::{batch::Batch, record::Record},
    source::descriptor::{CursorStrategy, ResourceDescriptor, SourceDescriptor},
};
use std::{
    cmp::Ordering as CmpOrdering,
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Returns whatever batches were staged for the next extraction of a
/// resource, ignoring the marker it is started from.
pub struct ScriptedSource {
    descriptor: SourceDescriptor,
    staged: Mutex<HashMap<String, Vec<Batch>>>,
    extractions: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(name: &str, resources: Vec<ResourceDescriptor>) -> Self {
        ScriptedSource {
            descriptor: SourceDescriptor::new(name, resources),
            staged: Mutex::new(HashMap::new()),
            extractions: AtomicUsize::new(0),
        }
    }

    pub fn stage(&self, resource: &str, batches: Vec<Batch>) {
        self.staged
            .lock()
            .unwrap()
            .insert(resource.to_string(), batches);
    }

    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }
}

impl Source for ScriptedSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn extractor(
        &self,
        resource: &ResourceDescriptor,
        _: Marker,
        _: &ExtractRequest,
    ) -> Result<Box<dyn Extractor>, ConfigError> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        let batches = self
            .staged
            .lock()
            .unwrap()
            .get(&resource.name)
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(StaticExtractor::new(batches)))
    }
}

/// Upstream API with one row-cursored resource. Requests start at the stored
/// cursor value (inclusive) and the real row tracker drops what was loaded.
pub struct RowApi {
    descriptor: SourceDescriptor,
    rows: Mutex<Vec<Record>>,
    extractions: AtomicUsize,
}

impl RowApi {
    pub fn new(name: &str, resource: ResourceDescriptor) -> Self {
        RowApi {
            descriptor: SourceDescriptor::new(name, vec![resource]),
            rows: Mutex::new(Vec::new()),
            extractions: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, records: Vec<Record>) {
        self.rows.lock().unwrap().extend(records);
    }

    /// Replaces the upstream copy of every record with the same key.
    pub fn correct(&self, record: Record) {
        let resource = &self.descriptor.resources[0];
        let key = record.key(&resource.primary_key).ok();
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|r| r.key(&resource.primary_key).ok() != key);
        rows.push(record);
    }

    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }
}

impl Source for RowApi {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn extractor(
        &self,
        resource: &ResourceDescriptor,
        marker: Marker,
        _: &ExtractRequest,
    ) -> Result<Box<dyn Extractor>, ConfigError> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        let CursorStrategy::Row { field, max_ties, .. } = &resource.cursor else {
            return Err(ConfigError::Descriptor(format!("{} has no row cursor", resource.name)));
        };
        let tracker = RowTracker::new(&resource.name, &marker, *max_ties);
        let upstream = self.rows.lock().unwrap().clone();
        let rows = upstream
            .into_iter()
            .filter(|r| match tracker.start_value() {
                Some(start) => r.get_value(field).compare(start) != CmpOrdering::Less,
                None => true,
            })
            .collect();

        Ok(Box::new(RowApiExtractor {
            resource: resource.clone(),
            field: field.clone(),
            rows: Some(rows),
            tracker,
        }))
    }
}

struct RowApiExtractor {
    resource: ResourceDescriptor,
    field: String,
    rows: Option<Vec<Record>>,
    tracker: RowTracker,
}

#[async_trait]
impl Extractor for RowApiExtractor {
    async fn next_batch(&mut self) -> Result<Option<Batch>, ExtractError> {
        let Some(rows) = self.rows.take() else {
            return Ok(None);
        };
        let mut emitted = Vec::new();
        for record in rows {
            let key = record
                .key(&self.resource.primary_key)
                .map(|k| k.to_string())
                .unwrap_or_default();
            let value = record.get(&self.field).cloned().unwrap_or(Value::Null);
            if self.tracker.admit(&value, &key) {
                emitted.push(record);
            }
        }
        if emitted.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            Batch::new(&self.resource.name, "row-api", emitted).with_marker(self.tracker.marker()),
        ))
    }
}

/// Cursor store whose next commits can be made to fail, standing in for a
/// crash between the load and the cursor write.
pub struct FlakyStore {
    inner: Arc<dyn CursorStore>,
    fail_commits: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn CursorStore>) -> Self {
        FlakyStore {
            inner,
            fail_commits: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_commits(&self, count: usize) {
        self.fail_commits.store(count, Ordering::SeqCst);
    }

    fn injected(&self) -> Result<(), StateStoreError> {
        match self
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(_) => Err(StateStoreError::Storage("injected crash before cursor write".into())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl CursorStore for FlakyStore {
    async fn load(&self, key: &CursorKey) -> Result<Option<CursorEntry>, StateStoreError> {
        self.inner.load(key).await
    }

    async fn set(&self, key: &CursorKey, entry: CursorEntry) -> Result<(), StateStoreError> {
        self.injected()?;
        self.inner.set(key, entry).await
    }

    async fn compare_and_set(
        &self,
        key: &CursorKey,
        expected: Option<&Marker>,
        entry: CursorEntry,
    ) -> Result<(), StateStoreError> {
        self.injected()?;
        self.inner.compare_and_set(key, expected, entry).await
    }

    async fn list(&self, source: &str) -> Result<Vec<(CursorKey, CursorEntry)>, StateStoreError> {
        self.inner.list(source).await
    }

    async fn delete(&self, key: &CursorKey) -> Result<bool, StateStoreError> {
        self.inner.delete(key).await
    }
}
