use model::{
    core::value::Value,
    cursor::marker::{Marker, RowMarker},
};
use std::cmp::Ordering;
use tracing::warn;

/// Row-level cursor bookkeeping for one extraction.
///
/// Records at or below the stored value whose key was already loaded are
/// dropped. The tracker keeps the highest value seen and the keys emitted at
/// exactly that value, so the next run can skip them.
#[derive(Debug, Clone)]
pub struct RowTracker {
    stored: Option<RowMarker>,
    current: Option<RowMarker>,
    max_ties: usize,
    warned: bool,
    resource: String,
}

impl RowTracker {
    pub fn new(resource: &str, marker: &Marker, max_ties: usize) -> Self {
        let stored = marker.as_row().cloned();
        RowTracker {
            current: stored.clone(),
            stored,
            max_ties,
            warned: false,
            resource: resource.to_string(),
        }
    }

    /// Value upstream requests should start from (inclusive), if any.
    pub fn start_value(&self) -> Option<&Value> {
        self.stored.as_ref().map(|m| &m.value)
    }

    /// Decides whether a record should be emitted and updates the tracked
    /// maximum. Records without a cursor value are always emitted and do not
    /// move the cursor.
    pub fn admit(&mut self, value: &Value, key: &str) -> bool {
        if value.is_null() {
            return true;
        }
        if let Some(stored) = &self.stored
            && stored.covers(value, key)
        {
            return false;
        }

        match &mut self.current {
            None => {
                let mut marker = RowMarker::new(value.clone());
                marker.boundary_keys.insert(key.to_string());
                self.current = Some(marker);
            }
            Some(current) => match value.compare(&current.value) {
                Ordering::Greater => {
                    current.value = value.clone();
                    current.boundary_keys.clear();
                    current.boundary_keys.insert(key.to_string());
                }
                Ordering::Equal => {
                    current.boundary_keys.insert(key.to_string());
                    if current.boundary_keys.len() > self.max_ties && !self.warned {
                        self.warned = true;
                        warn!(
                            resource = %self.resource,
                            value = %current.value,
                            ties = current.boundary_keys.len(),
                            max_ties = self.max_ties,
                            "Too many records share one cursor value; use a batch-level cursor for this resource"
                        );
                    }
                }
                Ordering::Less => {}
            },
        }
        true
    }

    /// Marker covering everything admitted so far.
    pub fn marker(&self) -> Marker {
        match &self.current {
            Some(current) => Marker::Row(current.clone()),
            None => Marker::Initial,
        }
    }

    pub fn ties(&self) -> usize {
        self.current
            .as_ref()
            .map(|m| m.boundary_keys.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn skips_boundary_ties_loaded_before() {
        let mut stored = RowMarker::new(Value::from("2025-01-02"));
        stored.boundary_keys.insert("a".to_string());
        let mut tracker = RowTracker::new("spend", &Marker::Row(stored), 100);

        assert!(!tracker.admit(&Value::from("2025-01-01"), "z"));
        assert!(!tracker.admit(&Value::from("2025-01-02"), "a"));
        assert!(tracker.admit(&Value::from("2025-01-02"), "b"));

        let Marker::Row(marker) = tracker.marker() else {
            panic!("expected row marker");
        };
        assert_eq!(marker.value, Value::from("2025-01-02"));
        assert_eq!(marker.boundary_keys.len(), 2);
    }

    #[test]
    fn advancing_discards_old_ties() {
        let mut tracker = RowTracker::new("spend", &Marker::Initial, 100);
        tracker.admit(&Value::from("2025-01-01"), "a");
        tracker.admit(&Value::from("2025-01-03"), "b");
        tracker.admit(&Value::from("2025-01-02"), "c");

        let marker = tracker.marker();
        let row = marker.as_row().unwrap();
        assert_eq!(row.value, Value::from("2025-01-03"));
        assert_eq!(row.boundary_keys.iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn null_cursor_values_pass_through() {
        let mut tracker = RowTracker::new("events", &Marker::Initial, 100);
        assert!(tracker.admit(&Value::Null, "x"));
        assert_eq!(tracker.marker(), Marker::Initial);
    }

    #[traced_test]
    #[test]
    fn warns_once_when_ties_exceed_bound() {
        let mut tracker = RowTracker::new("orders", &Marker::Initial, 3);
        for i in 0..10 {
            tracker.admit(&Value::from("2025-01-01"), &i.to_string());
        }
        assert_eq!(tracker.ties(), 10);
        assert!(logs_contain("Too many records share one cursor value"));
    }
}
