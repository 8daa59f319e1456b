use chrono::{DateTime, Utc};
use model::cursor::marker::Marker;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CursorEntry {
    pub marker: Marker,
    /// Load that committed this marker.
    pub load_id: String,
    pub updated_at: DateTime<Utc>,
}

impl CursorEntry {
    pub fn new(marker: Marker, load_id: impl Into<String>) -> Self {
        CursorEntry {
            marker,
            load_id: load_id.into(),
            updated_at: Utc::now(),
        }
    }
}
