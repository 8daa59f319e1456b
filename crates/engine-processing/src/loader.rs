use crate::{
    error::{LoadError, SchemaViolation},
    normalize::{CLIENT_ID_COLUMN, LOADED_AT_COLUMN},
};
use engine_core::destination::{Destination, TableSchema};
use model::{
    core::data_type::DataType,
    records::record::{Record, RecordKey},
    source::descriptor::{CoercionPolicy, ResourceDescriptor, WriteDisposition},
};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    pub table: String,
    pub rows: usize,
    /// Records dropped because a later record in the batch had the same key.
    pub superseded: usize,
}

/// Applies normalized batches to the destination according to each
/// resource's write disposition.
#[derive(Clone)]
pub struct Loader {
    destination: Arc<dyn Destination>,
}

impl Loader {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Loader { destination }
    }

    pub fn destination(&self) -> &Arc<dyn Destination> {
        &self.destination
    }

    pub async fn load(&self, resource: &ResourceDescriptor, records: Vec<Record>) -> Result<LoadOutcome, LoadError> {
        let (records, superseded) = match resource.disposition {
            WriteDisposition::Merge => dedup_by_key(resource, records)?,
            _ => {
                check_keys(resource, &records)?;
                (records, 0)
            }
        };

        let wanted = infer_schema(resource, &records);
        let schema = self
            .destination
            .ensure_table(&wanted)
            .await
            .map_err(|e| LoadError::destination(&resource.table, e))?;

        let rows = match resource.disposition {
            WriteDisposition::Append => self.destination.append(&schema, &records).await,
            WriteDisposition::Merge => self.destination.upsert(&schema, &records).await,
            WriteDisposition::Replace => self.destination.replace(&schema, &records).await,
        }
        .map_err(|e| LoadError::destination(&resource.table, e))?;

        info!(
            table = %resource.table,
            disposition = %resource.disposition,
            destination = self.destination.name(),
            rows,
            superseded,
            "Loaded batch"
        );
        Ok(LoadOutcome {
            table: resource.table.clone(),
            rows,
            superseded,
        })
    }
}

fn check_keys(resource: &ResourceDescriptor, records: &[Record]) -> Result<(), SchemaViolation> {
    for (index, record) in records.iter().enumerate() {
        record
            .key(&resource.primary_key)
            .map_err(|missing| SchemaViolation::MissingKey {
                resource: resource.name.clone(),
                column: missing.column,
                index,
            })?;
    }
    Ok(())
}

/// Keeps the last record for every key, at the position where the key first
/// appeared. Fails on the first record without a complete key.
pub fn dedup_by_key(
    resource: &ResourceDescriptor,
    records: Vec<Record>,
) -> Result<(Vec<Record>, usize), SchemaViolation> {
    let total = records.len();
    let mut positions: HashMap<RecordKey, usize> = HashMap::with_capacity(total);
    let mut unique: Vec<Record> = Vec::with_capacity(total);

    for (index, record) in records.into_iter().enumerate() {
        let key = record
            .key(&resource.primary_key)
            .map_err(|missing| SchemaViolation::MissingKey {
                resource: resource.name.clone(),
                column: missing.column,
                index,
            })?;
        match positions.get(&key) {
            Some(&pos) => unique[pos] = record,
            None => {
                positions.insert(key, unique.len());
                unique.push(record);
            }
        }
    }

    let superseded = total - unique.len();
    if superseded > 0 {
        debug!(resource = %resource.name, superseded, "Collapsed duplicate keys");
    }
    Ok((unique, superseded))
}

/// Table shape for a batch: declared columns first, then every other column
/// in order of appearance, typed from the values seen.
pub fn infer_schema(resource: &ResourceDescriptor, records: &[Record]) -> TableSchema {
    let mut schema = TableSchema::new(&resource.table, resource.primary_key.clone());
    let declared = resource.coercion == CoercionPolicy::Coerce;

    if declared {
        for column in &resource.columns {
            schema.add_column(&column.name, column.data_type.clone());
        }
    }

    let mut observed: Vec<(String, Option<DataType>)> = Vec::new();
    for record in records {
        for field in record.fields() {
            if declared && schema.has_column(&field.name) {
                continue;
            }
            let seen = DataType::infer(&field.value);
            match observed.iter_mut().find(|(name, _)| *name == field.name) {
                Some((_, current)) => *current = widen(current.take(), seen),
                None => observed.push((field.name.clone(), seen)),
            }
        }
    }

    for (name, data_type) in observed {
        let data_type = match name.as_str() {
            LOADED_AT_COLUMN => DataType::Timestamp,
            CLIENT_ID_COLUMN => DataType::Text,
            _ => data_type.unwrap_or(DataType::Text),
        };
        schema.add_column(&name, data_type);
    }
    schema
}

fn widen(current: Option<DataType>, seen: Option<DataType>) -> Option<DataType> {
    match (current, seen) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) if a == b => Some(a),
        (Some(DataType::BigInt), Some(DataType::Double)) | (Some(DataType::Double), Some(DataType::BigInt)) => {
            Some(DataType::Double)
        }
        _ => Some(DataType::Text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{destination::memory::MemoryDestination, error::DestinationError};
    use tracing_test::traced_test;
    use model::{
        core::value::Value,
        source::descriptor::ExtractionKind,
    };

    fn orders() -> ResourceDescriptor {
        ResourceDescriptor::new("orders", ExtractionKind::FileListing)
            .primary_key(&["file_id", "row_id"])
            .disposition(WriteDisposition::Merge)
    }

    fn order(file_id: &str, row_id: i64, status: &str) -> Record {
        Record::new()
            .with("file_id", file_id)
            .with("row_id", row_id)
            .with("status", status)
    }

    #[test]
    fn last_record_per_key_wins() {
        let records = vec![order("f1", 1, "NEW"), order("f1", 2, "NEW"), order("f1", 1, "DECLINED")];
        let (unique, superseded) = dedup_by_key(&orders(), records).unwrap();
        assert_eq!(superseded, 1);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].get_value("status"), Value::from("DECLINED"));
        assert_eq!(unique[1].get_value("row_id"), Value::Int(2));
    }

    #[test]
    fn schema_inference_widens_and_types_tags() {
        let resource = ResourceDescriptor::new("spend", ExtractionKind::ApiPaginated)
            .column("date", DataType::Date);
        let records = vec![
            Record::new().with("date", "2025-01-01").with("cost", 1).with("_loaded_at", "x"),
            Record::new().with("date", "2025-01-02").with("cost", 1.5).with("note", Value::Null),
        ];
        let schema = infer_schema(&resource, &records);
        assert_eq!(schema.column_names(), vec!["date", "cost", "_loaded_at", "note"]);
        assert_eq!(schema.column("date").unwrap().data_type, DataType::Date);
        assert_eq!(schema.column("cost").unwrap().data_type, DataType::Double);
        assert_eq!(schema.column("_loaded_at").unwrap().data_type, DataType::Timestamp);
        assert_eq!(schema.column("note").unwrap().data_type, DataType::Text);
    }

    #[traced_test]
    #[tokio::test]
    async fn merge_overwrites_existing_rows() {
        let destination = Arc::new(MemoryDestination::new());
        let loader = Loader::new(destination.clone());

        loader.load(&orders(), vec![order("f1", 1, "NEW")]).await.unwrap();
        loader.load(&orders(), vec![order("f1", 1, "DECLINED")]).await.unwrap();

        let rows = destination.rows("orders").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_value("status"), Value::from("DECLINED"));
        assert!(logs_contain("Loaded batch"));
    }

    #[tokio::test]
    async fn missing_key_writes_nothing() {
        let destination = Arc::new(MemoryDestination::new());
        let loader = Loader::new(destination.clone());

        let records = vec![order("f1", 1, "NEW"), Record::new().with("file_id", "f1")];
        let err = loader.load(&orders(), records).await.unwrap_err();
        assert!(matches!(err, LoadError::Schema(SchemaViolation::MissingKey { index: 1, .. })));
        assert_eq!(destination.write_calls(), 0);
        assert!(destination.rows("orders").await.is_empty());
    }

    #[tokio::test]
    async fn destination_failures_name_the_table() {
        let destination = Arc::new(MemoryDestination::new());
        destination.fail_next_writes(1);
        let loader = Loader::new(destination);

        let err = loader.load(&orders(), vec![order("f1", 1, "NEW")]).await.unwrap_err();
        match err {
            LoadError::Destination { table, source } => {
                assert_eq!(table, "orders");
                assert!(matches!(source, DestinationError::Unavailable(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn replace_swaps_contents() {
        let destination = Arc::new(MemoryDestination::new());
        let loader = Loader::new(destination.clone());
        let flags = ResourceDescriptor::new("flags", ExtractionKind::ApiPaginated)
            .disposition(WriteDisposition::Replace);

        loader
            .load(&flags, vec![Record::new().with("key", "a"), Record::new().with("key", "b")])
            .await
            .unwrap();
        loader.load(&flags, vec![Record::new().with("key", "c")]).await.unwrap();

        let rows = destination.rows("flags").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_value("key"), Value::from("c"));
    }
}
