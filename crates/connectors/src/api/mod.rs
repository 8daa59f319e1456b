//! HTTP API sources. Each resource is fetched page by page into a single
//! batch, so the marker is only committed once every page has been loaded.

use crate::incremental::row::RowTracker;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use engine_core::{
    error::{ConfigError, ExtractError},
    source::{DateWindow, Extractor},
};
use model::{
    core::value::Value,
    cursor::marker::Marker,
    records::{batch::Batch, record::Record},
    source::descriptor::{CursorStrategy, ResourceDescriptor, WriteDisposition},
};
use tracing::info;

pub mod everflow;
pub mod mautic;
pub mod posthog;
pub mod redtrack;

/// One page of upstream records at a time; `None` once exhausted.
#[async_trait]
pub(crate) trait PageFetcher: Send {
    async fn next_page(&mut self) -> Result<Option<Vec<Record>>, ExtractError>;

    /// Human-readable description of what was requested.
    fn origin(&self) -> String;
}

/// Drains a page fetcher, drops records the stored row cursor already
/// covers, and yields everything as one batch carrying the new marker.
pub(crate) struct PagedExtractor<P> {
    resource: ResourceDescriptor,
    fetcher: P,
    tracker: Option<RowTracker>,
    finished: bool,
}

impl<P: PageFetcher> PagedExtractor<P> {
    pub(crate) fn new(resource: &ResourceDescriptor, marker: &Marker, fetcher: P) -> Self {
        let tracker = match &resource.cursor {
            CursorStrategy::Row { max_ties, .. } => {
                Some(RowTracker::new(&resource.name, marker, *max_ties))
            }
            _ => None,
        };
        PagedExtractor {
            resource: resource.clone(),
            fetcher,
            tracker,
            finished: false,
        }
    }

    fn admit(&mut self, record: &Record) -> bool {
        let (Some(tracker), CursorStrategy::Row { field, .. }) = (&mut self.tracker, &self.resource.cursor)
        else {
            return true;
        };
        let key = record
            .key(&self.resource.primary_key)
            .map(|k| k.to_string())
            .unwrap_or_default();
        tracker.admit(&record.get_value(field), &key)
    }
}

#[async_trait]
impl<P: PageFetcher> Extractor for PagedExtractor<P> {
    async fn next_batch(&mut self) -> Result<Option<Batch>, ExtractError> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;

        let mut records = Vec::new();
        let mut fetched = 0usize;
        let mut pages = 0usize;
        while let Some(page) = self.fetcher.next_page().await? {
            pages += 1;
            fetched += page.len();
            for record in page {
                if self.admit(&record) {
                    records.push(record);
                }
            }
        }

        info!(
            resource = %self.resource.name,
            pages,
            fetched,
            emitted = records.len(),
            skipped = fetched - records.len(),
            "Extracted resource"
        );

        // An empty listing still swaps a replace table.
        if records.is_empty() && self.resource.disposition != WriteDisposition::Replace {
            return Ok(None);
        }

        let batch = Batch::new(&self.resource.name, self.fetcher.origin(), records);
        Ok(Some(match &self.tracker {
            Some(tracker) => batch.with_marker(tracker.marker()),
            None => batch,
        }))
    }
}

pub(crate) fn yesterday() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(1)
}

/// Inclusive day range for date-cursored reports: from the window start, or
/// the stored cursor date, or `fallback`; up to the window end or yesterday.
pub(crate) fn day_range(
    marker: &Marker,
    window: &DateWindow,
    fallback: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), ExtractError> {
    let stored = match marker.as_row().map(|m| &m.value) {
        Some(Value::String(text)) => Some(parse_day(text)?),
        _ => None,
    };
    let start = window.start.or(stored).unwrap_or(fallback);
    let end = window.end.unwrap_or_else(yesterday);
    Ok((start, end))
}

fn parse_day(text: &str) -> Result<NaiveDate, ExtractError> {
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
        ExtractError::Config(ConfigError::InvalidValue {
            key: "cursor".to_string(),
            reason: format!("stored cursor '{text}' is not a date: {e}"),
        })
    })
}

/// Lower bound for timestamp-cursored resources: stored value, window start,
/// or `default_lookback` before now.
pub(crate) fn since_timestamp(marker: &Marker, window: &DateWindow, default_lookback: Duration) -> String {
    if let Some(start) = window.start {
        return format!("{start}T00:00:00");
    }
    match marker.as_row().and_then(|m| m.value.to_text()) {
        Some(value) => value,
        None => (Utc::now() - default_lookback)
            .naive_utc()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
    }
}

/// Reads a list of objects from a payload that is either a bare array or an
/// object wrapping one under any of `keys`.
pub(crate) fn rows_from_payload(payload: &serde_json::Value, keys: &[&str]) -> Vec<serde_json::Value> {
    if let Some(list) = payload.as_array() {
        return list.clone();
    }
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(|v| v.as_array()))
        .cloned()
        .unwrap_or_default()
}
