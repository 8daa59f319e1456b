#[cfg(test)]
mod tests {
    use crate::{
        fakes::{RowApi, ScriptedSource},
        harness::{Harness, options},
    };
    use engine_processing::error::{LoadError, SchemaViolation};
    use engine_runtime::error::PipelineError;
    use model::{
        core::value::Value,
        cursor::marker::{Marker, RowMarker},
        records::{batch::Batch, record::Record},
        source::descriptor::{CursorStrategy, ExtractionKind, ResourceDescriptor, WriteDisposition},
    };
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn orders() -> ResourceDescriptor {
        ResourceDescriptor::new("orders", ExtractionKind::FileListing)
            .primary_key(&["file_id", "row_id"])
            .disposition(WriteDisposition::Merge)
    }

    fn order(row_id: i64, status: &str) -> Record {
        Record::new()
            .with("file_id", "f1")
            .with("row_id", row_id)
            .with("status", status)
    }

    fn contacts() -> ResourceDescriptor {
        ResourceDescriptor::new("contacts", ExtractionKind::ApiPaginated)
            .primary_key(&["id"])
            .disposition(WriteDisposition::Merge)
            .cursor(CursorStrategy::row("modified", Value::Null))
    }

    fn contact(id: i64, modified: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("modified", modified)
            .with("email", format!("c{id}@example.com"))
    }

    fn events() -> ResourceDescriptor {
        ResourceDescriptor::new("events", ExtractionKind::ApiPaginated)
            .primary_key(&["uuid"])
            .disposition(WriteDisposition::Append)
            .cursor(CursorStrategy::row("timestamp", Value::Null))
    }

    fn event(n: usize, timestamp: &str) -> Record {
        Record::new()
            .with("uuid", format!("evt-{n:04}"))
            .with("timestamp", timestamp)
            .with("event", "pageview")
    }

    fn batch_marker(day: &str) -> Marker {
        Marker::Row(RowMarker::new(Value::from(day)))
    }

    #[tokio::test]
    async fn rerunning_a_merge_window_changes_nothing() {
        let source = Arc::new(ScriptedSource::new("orders", vec![orders()]));
        let batch = Batch::new("orders", "export", vec![order(1, "NEW"), order(2, "PAID"), order(1, "NEW")]);
        source.stage("orders", vec![batch]);
        let harness = Harness::new(vec![source.clone()]);

        harness.run("orders", &options()).await.unwrap();
        let first = harness.table("orders").await;
        harness.run("orders", &options()).await.unwrap();
        let second = harness.table("orders").await;

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn committed_marker_never_moves_backwards() {
        let api = Arc::new(RowApi::new("crm", contacts()));
        let harness = Harness::new(vec![api.clone()]);

        let arrivals = vec![
            vec![contact(1, "2025-01-01T10:00:00"), contact(2, "2025-01-01T11:00:00")],
            vec![contact(3, "2025-01-01T11:00:00")],
            // Late arrival older than the cursor, then nothing new at all.
            vec![contact(4, "2025-01-01T09:00:00")],
            vec![],
            vec![contact(5, "2025-01-02T08:00:00"), contact(2, "2025-01-02T08:00:00")],
        ];

        let mut previous: Option<Marker> = None;
        for records in arrivals {
            api.push(records);
            harness.run("crm", &options()).await.unwrap();
            let current = harness.marker("crm", "contacts").await;
            if let (Some(prev), Some(cur)) = (&previous, &current) {
                assert!(!cur.is_behind(prev), "{cur} is behind {prev}");
            }
            previous = current.or(previous);
        }

        let Some(Marker::Row(last)) = previous else {
            panic!("expected a row marker");
        };
        assert_eq!(last.value, Value::from("2025-01-02T08:00:00"));
        assert_eq!(last.boundary_keys.len(), 2);
    }

    #[tokio::test]
    async fn crash_between_load_and_commit_replays_to_same_state() {
        let rows = vec![
            contact(1, "2025-01-01T10:00:00"),
            contact(2, "2025-01-01T10:00:00"),
            contact(3, "2025-01-01T12:00:00"),
        ];

        let api = Arc::new(RowApi::new("crm", contacts()));
        api.push(rows.clone());
        let harness = Harness::new(vec![api.clone()]);

        harness.store.fail_next_commits(1);
        let err = harness.run("crm", &options()).await.unwrap_err();
        assert!(!err.is_fatal(), "a lost cursor write must be retryable: {err}");
        assert!(matches!(err.root(), PipelineError::State { .. }));
        assert_eq!(harness.table("contacts").await.len(), 3);
        assert!(harness.marker("crm", "contacts").await.is_none());

        let replay = harness.run("crm", &options()).await.unwrap();
        assert_eq!(replay.total_rows(), 3);

        let control_api = Arc::new(RowApi::new("crm", contacts()));
        control_api.push(rows);
        let control = Harness::new(vec![control_api]);
        control.run("crm", &options()).await.unwrap();

        assert_eq!(harness.table("contacts").await, control.table("contacts").await);
        assert_eq!(
            harness.marker("crm", "contacts").await,
            control.marker("crm", "contacts").await
        );
    }

    #[tokio::test]
    async fn missing_primary_key_rejects_the_whole_batch() {
        let source = Arc::new(ScriptedSource::new("orders", vec![orders()]));
        let broken = Record::new().with("file_id", "f1").with("status", "NEW");
        let batch = Batch::new("orders", "export", vec![order(1, "NEW"), broken, order(3, "NEW")])
            .with_marker(batch_marker("2025-01-01"));
        source.stage("orders", vec![batch]);
        let harness = Harness::new(vec![source]);

        let err = harness.run("orders", &options()).await.unwrap_err();

        assert!(err.is_fatal());
        match err.root() {
            PipelineError::Load {
                source: LoadError::Schema(SchemaViolation::MissingKey { column, index, .. }),
                ..
            } => {
                assert_eq!(column, "row_id");
                assert_eq!(*index, 1);
            }
            other => panic!("expected a schema violation, got {other}"),
        }
        assert!(harness.table("orders").await.is_empty());
        assert_eq!(harness.destination.write_calls(), 0);
        assert!(harness.marker("orders", "orders").await.is_none());
    }

    #[traced_test]
    #[tokio::test]
    async fn dense_ties_on_row_cursor_are_skipped_in_one_pass() {
        let api = Arc::new(RowApi::new("product", events()));
        api.push((0..500).map(|n| event(n, "2025-01-01T00:00:00Z")).collect());
        let harness = Harness::new(vec![api.clone()]);

        let first = harness.run("product", &options()).await.unwrap();
        assert_eq!(first.total_rows(), 500);
        assert!(logs_contain("Too many records share one cursor value"));

        let Some(Marker::Row(marker)) = harness.marker("product", "events").await else {
            panic!("expected a row marker");
        };
        assert_eq!(marker.boundary_keys.len(), 500);

        let second = harness.run("product", &options()).await.unwrap();
        assert_eq!(second.total_rows(), 0);
        assert_eq!(second.resources[0].batches, 0);
        assert_eq!(harness.table("events").await.len(), 500);
    }
}
