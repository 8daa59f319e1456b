//! Extract, normalize and load one source, committing progress per batch.
//!
//! A batch's marker is written only after the destination has accepted the
//! batch. A crash between the two replays the batch on the next run, which
//! merge and replace absorb by key.

use crate::{error::PipelineError, options::RunOptions, registry::SourceRegistry};
use chrono::Utc;
use engine_core::{
    destination::Destination,
    error::ConfigError,
    source::{Extractor, Source},
    state::{CursorStore, models::CursorEntry},
};
use engine_processing::{error::LoadError, loader::Loader, normalize::Normalizer};
use model::{
    core::identifiers::LoadId,
    cursor::{key::CursorKey, marker::Marker},
    source::descriptor::{ResourceDescriptor, SourceDescriptor, WriteDisposition},
    summary::{LoadSummary, ResourceSummary},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct PipelineRunner {
    registry: Arc<SourceRegistry>,
    store: Arc<dyn CursorStore>,
    loader: Loader,
}

/// One resource ready to run: its extractor is built and its marker read.
struct ResourcePlan {
    resource: ResourceDescriptor,
    key: CursorKey,
    stored: Option<Marker>,
    extractor: Box<dyn Extractor>,
    commit: bool,
}

impl PipelineRunner {
    pub fn new(
        registry: Arc<SourceRegistry>,
        store: Arc<dyn CursorStore>,
        destination: Arc<dyn Destination>,
    ) -> Self {
        PipelineRunner {
            registry,
            store,
            loader: Loader::new(destination),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CursorStore> {
        &self.store
    }

    /// Runs `source_name` once.
    ///
    /// Configuration problems (unknown source or resource, missing credential,
    /// invalid options) are reported before any extraction or load happens.
    /// A failure after that point is returned as [`PipelineError::Failed`]
    /// carrying the summary of what was done.
    pub async fn run(
        &self,
        source_name: &str,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<LoadSummary, PipelineError> {
        let source = self.registry.get(source_name)?;
        options.validate()?;
        let resources = select_resources(source.descriptor(), &options.resources)?;

        let mut plans = Vec::with_capacity(resources.len());
        for resource in resources {
            plans.push(self.prepare(source.as_ref(), resource, options).await?);
        }

        let load_id = LoadId::generate();
        let mut summary = LoadSummary::new(load_id.clone(), source_name, &options.partition, options.dry_run);
        info!(
            source = %source_name,
            load_id = %load_id,
            partition = %options.partition,
            resources = plans.len(),
            dry_run = options.dry_run,
            "Starting pipeline run"
        );

        let normalizer = Normalizer::new(&options.client_id, Utc::now());
        for plan in plans {
            let mut resource_summary = ResourceSummary::new(&plan.resource.name, &plan.resource.table);
            let result = self
                .run_resource(plan, &normalizer, &load_id, options, cancel, &mut resource_summary)
                .await;
            let failure = result.err();
            if let Some(err) = &failure {
                resource_summary.error = Some(err.to_string());
            }
            summary.resources.push(resource_summary);

            if let Some(err) = failure {
                summary.finish();
                error!(
                    source = %source_name,
                    load_id = %load_id,
                    status = %summary.status,
                    fatal = err.is_fatal(),
                    error = %err,
                    "Pipeline run failed"
                );
                return Err(PipelineError::Failed {
                    summary: Box::new(summary),
                    source: Box::new(err),
                });
            }
        }

        summary.finish();
        info!(
            source = %source_name,
            load_id = %load_id,
            rows = summary.total_rows(),
            status = %summary.status,
            duration_ms = summary.duration_ms().unwrap_or_default(),
            "Pipeline run finished"
        );
        Ok(summary)
    }

    async fn prepare(
        &self,
        source: &dyn Source,
        resource: &ResourceDescriptor,
        options: &RunOptions,
    ) -> Result<ResourcePlan, PipelineError> {
        if !options.window.is_empty() && resource.disposition == WriteDisposition::Append {
            return Err(ConfigError::InvalidOptions(format!(
                "resource '{}' is append-only; a date window would load its rows twice",
                resource.name
            ))
            .into());
        }

        let key = CursorKey::new(&source.descriptor().name, &resource.name, &options.partition);
        let stored = self
            .store
            .load(&key)
            .await
            .map_err(|source| PipelineError::State {
                resource: resource.name.clone(),
                source,
            })?
            .map(|entry| entry.marker);

        // A window with a start re-reads from that start, so the extractor must
        // not filter on the stored cursor. Its marker is only kept when nothing
        // was stored yet; otherwise committing it could skip unread data.
        let backfill = options.window.start.is_some();
        let start = match (&stored, backfill) {
            (_, true) => Marker::Initial,
            (Some(marker), false) => marker.clone(),
            (None, false) => resource.cursor.initial_marker(),
        };
        let commit = !options.dry_run && !(backfill && stored.is_some());
        if backfill && stored.is_some() && !options.dry_run {
            info!(cursor = %key, "Window run; the stored cursor stays where it is");
        }

        let extractor = source.extractor(resource, start, &options.extract_request())?;
        Ok(ResourcePlan {
            resource: resource.clone(),
            key,
            stored,
            extractor,
            commit,
        })
    }

    async fn run_resource(
        &self,
        mut plan: ResourcePlan,
        normalizer: &Normalizer,
        load_id: &LoadId,
        options: &RunOptions,
        cancel: &CancellationToken,
        summary: &mut ResourceSummary,
    ) -> Result<(), PipelineError> {
        let resource = plan.resource.name.clone();
        let mut expected = plan.stored.clone();

        loop {
            if cancel.is_cancelled() {
                warn!(resource = %resource, batches = summary.batches, "Shutdown requested, stopping before next batch");
                return Err(PipelineError::Cancelled);
            }

            let Some(batch) = plan
                .extractor
                .next_batch()
                .await
                .map_err(|source| PipelineError::Extract {
                    resource: resource.clone(),
                    source,
                })?
            else {
                break;
            };

            summary.batches += 1;
            summary.rows_extracted += batch.len();
            let origin = batch.origin.clone();

            let normalized = normalizer
                .normalize_batch(&plan.resource, batch.records)
                .map_err(|violation| PipelineError::Load {
                    resource: resource.clone(),
                    source: LoadError::Schema(violation),
                })?;
            if normalized.nulled > 0 {
                warn!(resource = %resource, origin = %origin, cells = normalized.nulled, "Values not matching their declared type were set to NULL");
            }

            if options.dry_run {
                debug!(resource = %resource, origin = %origin, rows = normalized.records.len(), "Dry run, skipping load");
                continue;
            }

            let outcome = self
                .loader
                .load(&plan.resource, normalized.records)
                .await
                .map_err(|source| PipelineError::Load {
                    resource: resource.clone(),
                    source,
                })?;
            summary.rows_loaded += outcome.rows;

            if let (Some(marker), true) = (batch.marker, plan.commit) {
                self.commit(&plan.key, &resource, &mut expected, marker, load_id).await?;
                summary.committed = expected.clone();
            }
        }

        if !options.dry_run && summary.batches > 0 {
            match self.loader.destination().row_count(&plan.resource.table).await {
                Ok(rows) => summary.table_rows = Some(rows),
                Err(err) => warn!(table = %plan.resource.table, error = %err, "Could not count destination rows"),
            }
        }

        info!(
            resource = %resource,
            table = %plan.resource.table,
            batches = summary.batches,
            extracted = summary.rows_extracted,
            loaded = summary.rows_loaded,
            cursor = %expected.as_ref().map(|m| m.to_string()).unwrap_or_else(|| "none".into()),
            "Resource finished"
        );
        Ok(())
    }

    /// Moves the cursor forward from `expected` to `marker`.
    async fn commit(
        &self,
        key: &CursorKey,
        resource: &str,
        expected: &mut Option<Marker>,
        marker: Marker,
        load_id: &LoadId,
    ) -> Result<(), PipelineError> {
        if let Some(current) = expected.as_ref() {
            if marker.is_behind(current) {
                return Err(PipelineError::Regression {
                    key: key.to_string(),
                    stored: current.to_string(),
                    proposed: marker.to_string(),
                });
            }
            if *current == marker {
                return Ok(());
            }
        }

        self.store
            .compare_and_set(key, expected.as_ref(), CursorEntry::new(marker.clone(), load_id.as_str()))
            .await
            .map_err(|source| PipelineError::State {
                resource: resource.to_string(),
                source,
            })?;
        debug!(cursor = %key, marker = %marker, "Committed cursor");
        *expected = Some(marker);
        Ok(())
    }
}

/// Resources named in `filter`, in descriptor order; all of them when empty.
fn select_resources<'a>(
    descriptor: &'a SourceDescriptor,
    filter: &[String],
) -> Result<Vec<&'a ResourceDescriptor>, ConfigError> {
    if let Some(unknown) = filter.iter().find(|name| descriptor.resource(name).is_none()) {
        return Err(ConfigError::UnknownResource {
            source_name: descriptor.name.clone(),
            resource: unknown.clone(),
        });
    }
    Ok(descriptor
        .resources
        .iter()
        .filter(|r| filter.is_empty() || filter.contains(&r.name))
        .collect())
}
