use model::cursor::marker::{BatchMarker, Marker};

/// A discrete unit of upstream data (a file) with its ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRef {
    pub id: String,
    pub key: String,
}

/// Picks the batches still to load, oldest first.
///
/// Completion is tracked per batch, so the cost is proportional to the number
/// of batches and independent of the rows they hold. With `limit`, the oldest
/// pending batches are taken so the marker never jumps over unprocessed ones.
pub fn pending_batches(mut candidates: Vec<BatchRef>, marker: &Marker, limit: Option<usize>) -> Vec<BatchRef> {
    candidates.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.id.cmp(&b.id)));
    let mut pending: Vec<BatchRef> = match marker.as_batch() {
        Some(done) => candidates
            .into_iter()
            .filter(|b| !done.is_done(&b.key, &b.id))
            .collect(),
        None => candidates,
    };
    if let Some(limit) = limit {
        pending.truncate(limit);
    }
    pending
}

/// Marker after `batch` has been fully loaded on top of `marker`.
pub fn advance(marker: &Marker, batch: &BatchRef) -> Marker {
    let mut next = marker
        .as_batch()
        .cloned()
        .unwrap_or_else(|| BatchMarker::new(batch.key.clone()));
    next.advance(&batch.key, &batch.id);
    Marker::Batch(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(id: &str, key: &str) -> BatchRef {
        BatchRef {
            id: id.to_string(),
            key: key.to_string(),
        }
    }

    #[test]
    fn filters_completed_and_sorts() {
        let mut done = BatchMarker::new("2025-01-02");
        done.completed.insert("b.csv".to_string());
        let marker = Marker::Batch(done);

        let pending = pending_batches(
            vec![
                batch("d.csv", "2025-01-03"),
                batch("a.csv", "2025-01-01"),
                batch("c.csv", "2025-01-02"),
                batch("b.csv", "2025-01-02"),
            ],
            &marker,
            None,
        );
        assert_eq!(
            pending,
            vec![batch("c.csv", "2025-01-02"), batch("d.csv", "2025-01-03")]
        );
    }

    #[test]
    fn limit_takes_oldest() {
        let pending = pending_batches(
            vec![
                batch("c.csv", "2025-01-03"),
                batch("a.csv", "2025-01-01"),
                batch("b.csv", "2025-01-02"),
            ],
            &Marker::Initial,
            Some(2),
        );
        assert_eq!(pending[0].id, "a.csv");
        assert_eq!(pending[1].id, "b.csv");
    }

    #[test]
    fn advance_resets_completed_on_newer_key() {
        let first = advance(&Marker::Initial, &batch("a.csv", "2025-01-01"));
        let second = advance(&first, &batch("b.csv", "2025-01-01"));
        let third = advance(&second, &batch("c.csv", "2025-01-02"));

        assert_eq!(second.as_batch().unwrap().completed.len(), 2);
        let third = third.as_batch().unwrap();
        assert_eq!(third.last_key, "2025-01-02");
        assert_eq!(third.completed.len(), 1);
    }
}
