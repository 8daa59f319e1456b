#[cfg(test)]
mod tests {
    use crate::{
        fakes::{RowApi, ScriptedSource},
        harness::{options, runner},
        pg_client, reset_postgres_schema,
    };
    use chrono::NaiveDate;
    use connectors::sql::postgres::destination::PostgresDestination;
    use engine_core::state::memory::MemoryCursorStore;
    use model::{
        core::{data_type::DataType, value::Value},
        records::{batch::Batch, record::Record},
        source::descriptor::{CursorStrategy, ExtractionKind, ResourceDescriptor, WriteDisposition},
    };
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn destination() -> Arc<PostgresDestination> {
        reset_postgres_schema().await;
        Arc::new(PostgresDestination::from_client(pg_client().await, None))
    }

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

    #[tokio::test]
    #[ignore = "needs a Postgres server at TEST_PG_URL"]
    async fn merge_overwrites_rows_in_place() {
        let destination = destination().await;
        let source = Arc::new(ScriptedSource::new("orders", vec![orders()]));
        let runner = runner(vec![source.clone()], Arc::new(MemoryCursorStore::new()), destination);
        let cancel = CancellationToken::new();

        source.stage(
            "orders",
            vec![Batch::new("orders", "batch-1", vec![order(1, "NEW"), order(2, "NEW")])],
        );
        runner.run("orders", &options(), &cancel).await.unwrap();

        source.stage("orders", vec![Batch::new("orders", "batch-1", vec![order(1, "DECLINED")])]);
        runner.run("orders", &options(), &cancel).await.unwrap();

        let rows = pg_client()
            .await
            .query("SELECT row_id, status FROM orders ORDER BY row_id", &[])
            .await
            .unwrap();
        let got: Vec<(i64, String)> = rows.iter().map(|r| (r.get(0), r.get(1))).collect();
        assert_eq!(
            got,
            vec![(1, "DECLINED".to_string()), (2, "NEW".to_string())]
        );
    }

    #[tokio::test]
    #[ignore = "needs a Postgres server at TEST_PG_URL"]
    async fn reloaded_day_replaces_typed_cost() {
        let spend = ResourceDescriptor::new("daily_spend", ExtractionKind::ApiPaginated)
            .table("spend")
            .primary_key(&["date", "source_id"])
            .disposition(WriteDisposition::Merge)
            .cursor(CursorStrategy::row("date", Value::Null))
            .column("date", DataType::Date)
            .column("source_id", DataType::Text)
            .column("cost", DataType::Double);
        let api = Arc::new(RowApi::new("spend", spend));
        let runner = runner(vec![api.clone()], Arc::new(MemoryCursorStore::new()), destination().await);
        let cancel = CancellationToken::new();

        let cost = |amount: &str| {
            Record::new()
                .with("date", "2025-01-01")
                .with("source_id", "s1")
                .with("cost", amount)
        };
        api.push(vec![cost("100")]);
        runner.run("spend", &options(), &cancel).await.unwrap();

        api.correct(cost("150"));
        let day = NaiveDate::from_ymd_opt(2025, 1, 1);
        runner
            .run("spend", &options().window(day, day), &cancel)
            .await
            .unwrap();

        let rows = pg_client()
            .await
            .query("SELECT cost FROM spend", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<_, f64>(0), 150.0);
    }

    #[tokio::test]
    #[ignore = "needs a Postgres server at TEST_PG_URL"]
    async fn replace_swaps_the_whole_table() {
        let flags = ResourceDescriptor::new("feature_flags", ExtractionKind::ApiPaginated)
            .primary_key(&["id"])
            .disposition(WriteDisposition::Replace);
        let source = Arc::new(ScriptedSource::new("posthog", vec![flags]));
        let runner = runner(vec![source.clone()], Arc::new(MemoryCursorStore::new()), destination().await);
        let cancel = CancellationToken::new();

        let flag = |id: i64, key: &str| Record::new().with("id", id).with("key", key);
        source.stage(
            "feature_flags",
            vec![Batch::new("feature_flags", "list", vec![flag(1, "beta"), flag(2, "dark")])],
        );
        runner.run("posthog", &options(), &cancel).await.unwrap();

        source.stage(
            "feature_flags",
            vec![Batch::new("feature_flags", "list", vec![flag(3, "pricing")])],
        );
        runner.run("posthog", &options(), &cancel).await.unwrap();

        let rows = pg_client()
            .await
            .query("SELECT key FROM feature_flags", &[])
            .await
            .unwrap();
        let keys: Vec<String> = rows.iter().map(|r| r.get(0)).collect();
        assert_eq!(keys, vec!["pricing".to_string()]);
    }
}
