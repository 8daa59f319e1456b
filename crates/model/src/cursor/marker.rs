use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeSet, fmt};

/// How far a resource has been consumed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum Marker {
    /// Nothing consumed yet and no configured starting point.
    #[default]
    Initial,

    /// Row-level cursor: the highest cursor value loaded plus the keys already
    /// loaded at exactly that value, so ties on the boundary are not reloaded.
    Row(RowMarker),

    /// Batch-level cursor: the ordering key of the newest batch plus the ids of
    /// the batches fully loaded at that key.
    Batch(BatchMarker),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RowMarker {
    pub value: Value,
    pub boundary_keys: BTreeSet<String>,
}

impl RowMarker {
    pub fn new(value: Value) -> Self {
        RowMarker {
            value,
            boundary_keys: BTreeSet::new(),
        }
    }

    /// Whether a record with this cursor value and key was loaded by an earlier run.
    pub fn covers(&self, value: &Value, key: &str) -> bool {
        match value.compare(&self.value) {
            Ordering::Less => true,
            Ordering::Equal => self.boundary_keys.contains(key),
            Ordering::Greater => false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatchMarker {
    pub last_key: String,
    pub completed: BTreeSet<String>,
}

impl BatchMarker {
    pub fn new(last_key: impl Into<String>) -> Self {
        BatchMarker {
            last_key: last_key.into(),
            completed: BTreeSet::new(),
        }
    }

    /// Whether the batch was fully loaded by an earlier run.
    pub fn is_done(&self, key: &str, batch_id: &str) -> bool {
        match key.cmp(self.last_key.as_str()) {
            Ordering::Less => true,
            Ordering::Equal => self.completed.contains(batch_id),
            Ordering::Greater => false,
        }
    }

    /// Records a completed batch. Completion bookkeeping only covers the newest
    /// key, so the marker stays proportional to the batches sharing one key.
    pub fn advance(&mut self, key: &str, batch_id: &str) {
        match key.cmp(self.last_key.as_str()) {
            Ordering::Less => {}
            Ordering::Equal => {
                self.completed.insert(batch_id.to_string());
            }
            Ordering::Greater => {
                self.last_key = key.to_string();
                self.completed.clear();
                self.completed.insert(batch_id.to_string());
            }
        }
    }
}

impl Marker {
    /// True when `self` is strictly earlier than `other`.
    ///
    /// Markers of different kinds are not comparable and never count as behind,
    /// which lets an operator switch a resource between cursor strategies.
    pub fn is_behind(&self, other: &Marker) -> bool {
        match (self, other) {
            (Marker::Initial, Marker::Initial) => false,
            (Marker::Initial, _) => true,
            (_, Marker::Initial) => false,
            (Marker::Row(a), Marker::Row(b)) => a.value.compare(&b.value) == Ordering::Less,
            (Marker::Batch(a), Marker::Batch(b)) => a.last_key < b.last_key,
            _ => false,
        }
    }

    pub fn as_row(&self) -> Option<&RowMarker> {
        match self {
            Marker::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_batch(&self) -> Option<&BatchMarker> {
        match self {
            Marker::Batch(batch) => Some(batch),
            _ => None,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Initial => write!(f, "initial"),
            Marker::Row(row) => write!(
                f,
                "row value={} boundary_keys={}",
                row.value,
                row.boundary_keys.len()
            ),
            Marker::Batch(batch) => write!(
                f,
                "batch last_key={} completed={}",
                batch.last_key,
                batch.completed.len()
            ),
        }
    }
}
