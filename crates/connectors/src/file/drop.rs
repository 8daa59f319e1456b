//! Batch-level source over a local directory of CSV exports.
//!
//! Layout: `<root>/<prefix>/**/*.csv`, one resource per prefix. Every file is
//! a batch ordered by the `YYYY-MM-DD` date in its name, so progress costs one
//! entry per file no matter how many rows the file holds.

use crate::{
    file::csv::reader::read_records,
    incremental::batch::{BatchRef, advance, pending_batches},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use engine_config::settings::FileDropSettings;
use engine_core::{
    error::{ConfigError, ExtractError},
    source::{DateWindow, ExtractRequest, Extractor, Source},
};
use lazy_static::lazy_static;
use model::{
    core::{identifiers::table_name_from_prefix, value::Value},
    cursor::marker::Marker,
    records::batch::Batch,
    source::descriptor::{
        CoercionPolicy, CursorStrategy, ExtractionKind, ResourceDescriptor, SourceDescriptor,
        WriteDisposition,
    },
};
use regex::Regex;
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub const SOURCE_NAME: &str = "file_drop";

/// Files dated before this were loaded before incremental tracking existed.
pub const INITIAL_FILE_DATE: &str = "2025-12-18";

lazy_static! {
    static ref FILE_DATE: Regex = Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid file date pattern");
}

/// Date embedded in a file name, if any.
pub fn file_date(name: &str) -> Option<String> {
    let found = FILE_DATE.captures(name)?.get(1)?.as_str();
    NaiveDate::parse_from_str(found, "%Y-%m-%d")
        .ok()
        .map(|_| found.to_string())
}

pub struct FileDropSource {
    descriptor: SourceDescriptor,
    settings: FileDropSettings,
}

impl FileDropSource {
    pub fn new(settings: FileDropSettings) -> Self {
        let resources = settings
            .prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .map(|prefix| {
                let name = table_name_from_prefix(prefix);
                ResourceDescriptor::new(&name, ExtractionKind::FileListing)
                    .primary_key(&["_file_name", "_row_id"])
                    .disposition(WriteDisposition::Merge)
                    .cursor(CursorStrategy::Batch {
                        initial: Some(INITIAL_FILE_DATE.to_string()),
                    })
                    .coercion(CoercionPolicy::KeepText)
            })
            .collect();

        FileDropSource {
            descriptor: SourceDescriptor::new(SOURCE_NAME, resources),
            settings,
        }
    }

    fn prefix_for(&self, resource: &str) -> Option<&str> {
        self.settings
            .prefixes
            .iter()
            .find(|p| table_name_from_prefix(p) == resource)
            .map(String::as_str)
    }
}

impl Source for FileDropSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn extractor(
        &self,
        resource: &ResourceDescriptor,
        marker: Marker,
        request: &ExtractRequest,
    ) -> Result<Box<dyn Extractor>, ConfigError> {
        let root = self
            .settings
            .root
            .clone()
            .ok_or_else(|| ConfigError::MissingCredential {
                source_name: SOURCE_NAME.to_string(),
                field: "FILE_DROP_ROOT".to_string(),
            })?;
        let prefix = self
            .prefix_for(&resource.name)
            .ok_or_else(|| ConfigError::UnknownResource {
                source_name: SOURCE_NAME.to_string(),
                resource: resource.name.clone(),
            })?;

        Ok(Box::new(FileDropExtractor {
            resource: resource.name.clone(),
            root: root.clone(),
            dir: root.join(prefix),
            marker,
            window: request.window,
            limit: request.max_batches.or(self.settings.max_batches),
            pending: None,
        }))
    }
}

pub struct FileDropExtractor {
    resource: String,
    root: PathBuf,
    dir: PathBuf,
    marker: Marker,
    window: DateWindow,
    limit: Option<usize>,
    pending: Option<VecDeque<BatchRef>>,
}

impl FileDropExtractor {
    async fn plan(&self) -> Result<VecDeque<BatchRef>, ExtractError> {
        let files = list_csv_files(&self.dir).await?;
        let mut candidates = Vec::with_capacity(files.len());
        let mut undated = 0usize;

        for path in files {
            let id = path
                .strip_prefix(&self.root)
                .unwrap_or(path.as_path())
                .to_string_lossy()
                .replace('\\', "/");
            let Some(key) = file_date(&id) else {
                warn!(resource = %self.resource, file = %id, "Skipping file without a date in its name");
                undated += 1;
                continue;
            };
            if !in_window(&key, &self.window) {
                continue;
            }
            candidates.push(BatchRef { id, key });
        }

        let total = candidates.len();
        // An explicit window reloads whatever it covers.
        let reload = Marker::Initial;
        let done = if self.window.is_empty() { &self.marker } else { &reload };
        let pending = pending_batches(candidates, done, self.limit);

        info!(
            resource = %self.resource,
            dir = %self.dir.display(),
            found = total,
            undated,
            pending = pending.len(),
            marker = %self.marker,
            "Planned file batches"
        );
        Ok(pending.into())
    }
}

#[async_trait]
impl Extractor for FileDropExtractor {
    async fn next_batch(&mut self) -> Result<Option<Batch>, ExtractError> {
        if self.pending.is_none() {
            self.pending = Some(self.plan().await?);
        }
        let Some(next) = self.pending.as_mut().and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        let path = self.root.join(&next.id);
        let mut records = tokio::task::spawn_blocking(move || read_records(&path))
            .await
            .map_err(|e| ExtractError::io(&next.id, e))??;

        for (row_id, record) in records.iter_mut().enumerate() {
            record.set("_file_name", Value::from(next.id.as_str()));
            record.set("_row_id", Value::Int(row_id as i64));
            record.set("_file_date", Value::from(next.key.as_str()));
        }

        self.marker = advance(&self.marker, &next);
        info!(resource = %self.resource, file = %next.id, rows = records.len(), "Read file batch");

        Ok(Some(
            Batch::new(&self.resource, next.id.clone(), records).with_marker(self.marker.clone()),
        ))
    }
}

fn in_window(key: &str, window: &DateWindow) -> bool {
    let Ok(day) = NaiveDate::parse_from_str(key, "%Y-%m-%d") else {
        return false;
    };
    window.start.is_none_or(|start| day >= start) && window.end.is_none_or(|end| day <= end)
}

/// Recursively lists `*.csv` files under `dir`. A missing directory is empty.
async fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(ExtractError::io(current.display(), e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ExtractError::io(current.display(), e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ExtractError::io(path.display(), e))?;
            if file_type.is_dir() {
                stack.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            {
                found.push(path);
            }
        }
    }
    Ok(found)
}
