use crate::{cursor::marker::Marker, records::record::Record};

/// A unit of extracted data that is loaded atomically.
///
/// `marker` is the progress to commit once the batch is durably written; it is
/// `None` for resources that refresh fully on every run.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub resource: String,
    /// File path, page range or request window the rows came from.
    pub origin: String,
    pub records: Vec<Record>,
    pub marker: Option<Marker>,
    pub ts: chrono::DateTime<chrono::Utc>,
}

impl Batch {
    pub fn new(resource: &str, origin: impl Into<String>, records: Vec<Record>) -> Self {
        Batch {
            id: uuid::Uuid::new_v4().simple().to_string(),
            resource: resource.to_string(),
            origin: origin.into(),
            records,
            marker: None,
            ts: chrono::Utc::now(),
        }
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
