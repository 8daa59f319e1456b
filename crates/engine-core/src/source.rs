//! Contracts implemented by every integration.

use crate::error::{ConfigError, ExtractError};
use async_trait::async_trait;
use chrono::NaiveDate;
use model::{
    cursor::marker::Marker,
    records::batch::Batch,
    source::descriptor::{ResourceDescriptor, SourceDescriptor},
};

/// Inclusive date bounds requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Per-run parameters handed to an extractor.
#[derive(Debug, Clone, Default)]
pub struct ExtractRequest {
    pub partition: String,
    pub window: DateWindow,
    /// Upper bound on batches produced by batch-cursor resources.
    pub max_batches: Option<usize>,
}

/// Pulls one resource as a finite sequence of batches.
///
/// Each batch carries the marker to commit once it is durably loaded; the
/// marker of the last batch covers everything extracted.
#[async_trait]
pub trait Extractor: Send {
    async fn next_batch(&mut self) -> Result<Option<Batch>, ExtractError>;
}

pub trait Source: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Builds an extractor starting from `marker`. Credentials are checked
    /// here, so a misconfigured source fails before any request is made.
    fn extractor(
        &self,
        resource: &ResourceDescriptor,
        marker: Marker,
        request: &ExtractRequest,
    ) -> Result<Box<dyn Extractor>, ConfigError>;
}

/// Extractor over batches prepared in advance.
pub struct StaticExtractor {
    batches: std::vec::IntoIter<Batch>,
}

impl StaticExtractor {
    pub fn new(batches: Vec<Batch>) -> Self {
        StaticExtractor {
            batches: batches.into_iter(),
        }
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    async fn next_batch(&mut self) -> Result<Option<Batch>, ExtractError> {
        Ok(self.batches.next())
    }
}
