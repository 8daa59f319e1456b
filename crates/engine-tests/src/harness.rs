use crate::fakes::FlakyStore;
use engine_core::{
    destination::{Destination, memory::MemoryDestination},
    source::Source,
    state::{CursorStore, memory::MemoryCursorStore},
};
use engine_processing::normalize::LOADED_AT_COLUMN;
use engine_runtime::{
    error::PipelineError, options::RunOptions, registry::SourceRegistry, runner::PipelineRunner,
};
use model::{
    cursor::{key::CursorKey, marker::Marker},
    records::record::Record,
    summary::LoadSummary,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const CLIENT: &str = "713";

/// Runner wired to an in-memory destination and a cursor store that can be
/// made to fail.
pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub destination: Arc<MemoryDestination>,
    pub runner: Arc<PipelineRunner>,
}

impl Harness {
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        Self::with_store(sources, Arc::new(MemoryCursorStore::new()))
    }

    pub fn with_store(sources: Vec<Arc<dyn Source>>, store: Arc<dyn CursorStore>) -> Self {
        let store = Arc::new(FlakyStore::new(store));
        let destination = Arc::new(MemoryDestination::new());
        let runner = runner(sources, store.clone(), destination.clone());
        Harness {
            store,
            destination,
            runner: Arc::new(runner),
        }
    }

    pub async fn run(&self, source: &str, options: &RunOptions) -> Result<LoadSummary, PipelineError> {
        self.runner.run(source, options, &CancellationToken::new()).await
    }

    pub async fn marker(&self, source: &str, resource: &str) -> Option<Marker> {
        self.store
            .load(&CursorKey::new(source, resource, CLIENT))
            .await
            .unwrap()
            .map(|entry| entry.marker)
    }

    /// Table rows without the load timestamp, in a stable order.
    pub async fn table(&self, table: &str) -> Vec<Record> {
        comparable(self.destination.rows(table).await)
    }
}

pub fn runner(
    sources: Vec<Arc<dyn Source>>,
    store: Arc<dyn CursorStore>,
    destination: Arc<dyn Destination>,
) -> PipelineRunner {
    let mut registry = SourceRegistry::new();
    for source in sources {
        registry.register(source).unwrap();
    }
    PipelineRunner::new(Arc::new(registry), store, destination)
}

pub fn options() -> RunOptions {
    RunOptions::new(CLIENT)
}

pub fn comparable(mut rows: Vec<Record>) -> Vec<Record> {
    for row in &mut rows {
        row.remove(LOADED_AT_COLUMN);
    }
    rows.sort_by_key(|r| format!("{:?}", r.fields()));
    rows
}
