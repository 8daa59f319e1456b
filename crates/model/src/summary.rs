use crate::{core::identifiers::LoadId, cursor::marker::Marker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Success,
    PartialFailure,
    Failure,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Success => f.write_str("success"),
            LoadStatus::PartialFailure => f.write_str("partial_failure"),
            LoadStatus::Failure => f.write_str("failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub resource: String,
    pub table: String,
    pub batches: usize,
    pub rows_extracted: usize,
    pub rows_loaded: usize,
    /// Last marker durably committed for this resource during the run.
    pub committed: Option<Marker>,
    /// Rows in the destination table once the resource finished loading.
    pub table_rows: Option<u64>,
    pub error: Option<String>,
}

impl ResourceSummary {
    pub fn new(resource: &str, table: &str) -> Self {
        ResourceSummary {
            resource: resource.to_string(),
            table: table.to_string(),
            batches: 0,
            rows_extracted: 0,
            rows_loaded: 0,
            committed: None,
            table_rows: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of one pipeline run over a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub load_id: LoadId,
    pub source: String,
    pub partition: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub resources: Vec<ResourceSummary>,
    pub status: LoadStatus,
}

impl LoadSummary {
    pub fn new(load_id: LoadId, source: &str, partition: &str, dry_run: bool) -> Self {
        LoadSummary {
            load_id,
            source: source.to_string(),
            partition: partition.to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            resources: Vec::new(),
            status: LoadStatus::Success,
        }
    }

    /// Rows loaded per destination table.
    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for resource in &self.resources {
            *counts.entry(resource.table.clone()).or_insert(0) += resource.rows_loaded;
        }
        counts
    }

    pub fn total_rows(&self) -> usize {
        self.resources.iter().map(|r| r.rows_loaded).sum()
    }

    /// Stamps the finish time and derives the status from the resource outcomes.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        let failed = self.resources.iter().filter(|r| !r.succeeded()).count();
        let progressed = self
            .resources
            .iter()
            .any(|r| r.succeeded() || r.rows_loaded > 0);

        self.status = match failed {
            0 => LoadStatus::Success,
            _ if progressed => LoadStatus::PartialFailure,
            _ => LoadStatus::Failure,
        };
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
