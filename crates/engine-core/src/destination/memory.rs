use crate::{
    destination::{Destination, TableSchema},
    error::DestinationError,
};
use async_trait::async_trait;
use model::records::record::{Record, RecordKey};
use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<Record>,
    index: HashMap<RecordKey, usize>,
}

impl MemTable {
    fn new(schema: TableSchema) -> Self {
        MemTable {
            schema,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// In-process destination with the same contract as the warehouse. Every
/// write is applied under one lock, so readers never see half a batch.
#[derive(Default)]
pub struct MemoryDestination {
    tables: RwLock<BTreeMap<String, MemTable>>,
    fail_writes: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` writes fail with `Unavailable`.
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    /// Number of successful write calls so far.
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub async fn schema(&self, table: &str) -> Option<TableSchema> {
        self.tables.read().await.get(table).map(|t| t.schema.clone())
    }

    fn begin_write(&self) -> Result<(), DestinationError> {
        let injected = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(DestinationError::Unavailable(
                "injected write failure".to_string(),
            ));
        }
        Ok(())
    }

    fn keys(schema: &TableSchema, records: &[Record]) -> Result<Vec<RecordKey>, DestinationError> {
        if schema.primary_key.is_empty() {
            return Err(DestinationError::MissingKey {
                table: schema.table.clone(),
            });
        }
        records
            .iter()
            .map(|r| {
                r.key(&schema.primary_key)
                    .map_err(|e| DestinationError::Database {
                        code: Some("23502".to_string()),
                        message: format!("null value in key column '{}' of '{}'", e.column, schema.table),
                    })
            })
            .collect()
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_table(&self, schema: &TableSchema) -> Result<TableSchema, DestinationError> {
        let mut tables = self.tables.write().await;
        match tables.get_mut(&schema.table) {
            Some(existing) => {
                let mut evolved = existing.schema.clone();
                let added = evolved.evolve(schema)?;
                if !added.is_empty() {
                    debug!(table = %schema.table, added = added.len(), "Added columns");
                    for row in existing.rows.iter_mut() {
                        *row = evolved.project(row);
                    }
                }
                existing.schema = evolved.clone();
                Ok(evolved)
            }
            None => {
                let created = schema.for_creation();
                tables.insert(schema.table.clone(), MemTable::new(created.clone()));
                Ok(created)
            }
        }
    }

    async fn append(&self, schema: &TableSchema, records: &[Record]) -> Result<usize, DestinationError> {
        self.begin_write()?;
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&schema.table)
            .ok_or_else(|| DestinationError::MissingTable(schema.table.clone()))?;

        let projected: Vec<Record> = records.iter().map(|r| table.schema.project(r)).collect();
        table.rows.extend(projected);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(records.len())
    }

    async fn upsert(&self, schema: &TableSchema, records: &[Record]) -> Result<usize, DestinationError> {
        self.begin_write()?;
        let keys = Self::keys(schema, records)?;

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&schema.table)
            .ok_or_else(|| DestinationError::MissingTable(schema.table.clone()))?;

        for (key, record) in keys.into_iter().zip(records) {
            let row = table.schema.project(record);
            match table.index.get(&key) {
                Some(&pos) => table.rows[pos] = row,
                None => {
                    table.index.insert(key, table.rows.len());
                    table.rows.push(row);
                }
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(records.len())
    }

    async fn replace(&self, schema: &TableSchema, records: &[Record]) -> Result<usize, DestinationError> {
        self.begin_write()?;
        let keys = if schema.primary_key.is_empty() {
            None
        } else {
            Some(Self::keys(schema, records)?)
        };

        // Build the shadow copy first, then swap it in.
        let mut shadow = MemTable::new(schema.clone());
        for (pos, record) in records.iter().enumerate() {
            shadow.rows.push(schema.project(record));
            if let Some(keys) = &keys {
                shadow.index.insert(keys[pos].clone(), pos);
            }
        }

        self.tables.write().await.insert(schema.table.clone(), shadow);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(records.len())
    }

    async fn row_count(&self, table: &str) -> Result<u64, DestinationError> {
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .map(|t| t.rows.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::{data_type::DataType, value::Value};

    fn orders_schema() -> TableSchema {
        let mut schema = TableSchema::new("orders", vec!["file_id".to_string(), "row_id".to_string()]);
        schema.add_column("file_id", DataType::Text);
        schema.add_column("row_id", DataType::BigInt);
        schema.add_column("status", DataType::Text);
        schema
    }

    fn order(row_id: i64, status: &str) -> Record {
        Record::new()
            .with("file_id", "f1")
            .with("row_id", row_id)
            .with("status", status)
    }

    #[tokio::test]
    async fn upsert_overwrites_matching_keys() {
        let dest = MemoryDestination::new();
        let schema = dest.ensure_table(&orders_schema()).await.unwrap();

        dest.upsert(&schema, &[order(1, "NEW"), order(2, "NEW")]).await.unwrap();
        dest.upsert(&schema, &[order(1, "DECLINED")]).await.unwrap();

        let rows = dest.rows("orders").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_value("status"), Value::from("DECLINED"));
    }

    #[tokio::test]
    async fn upsert_with_missing_key_writes_nothing() {
        let dest = MemoryDestination::new();
        let schema = dest.ensure_table(&orders_schema()).await.unwrap();

        let broken = Record::new().with("file_id", "f1").with("status", "NEW");
        let err = dest.upsert(&schema, &[order(1, "NEW"), broken]).await.unwrap_err();

        assert!(matches!(err, DestinationError::Database { .. }));
        assert_eq!(dest.row_count("orders").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn replace_swaps_contents() {
        let dest = MemoryDestination::new();
        let schema = dest.ensure_table(&orders_schema()).await.unwrap();
        dest.append(&schema, &[order(1, "NEW"), order(2, "NEW")]).await.unwrap();

        dest.replace(&schema, &[order(3, "NEW")]).await.unwrap();
        let rows = dest.rows("orders").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_value("row_id"), Value::Int(3));
    }

    #[tokio::test]
    async fn ensure_table_adds_columns_to_existing_rows() {
        let dest = MemoryDestination::new();
        let schema = dest.ensure_table(&orders_schema()).await.unwrap();
        dest.append(&schema, &[order(1, "NEW")]).await.unwrap();

        let mut wider = orders_schema();
        wider.add_column("amount", DataType::Double);
        let effective = dest.ensure_table(&wider).await.unwrap();

        assert!(effective.has_column("amount"));
        assert!(dest.rows("orders").await[0].get_value("amount").is_null());
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let dest = MemoryDestination::new();
        let schema = dest.ensure_table(&orders_schema()).await.unwrap();
        dest.fail_next_writes(1);

        assert!(matches!(
            dest.append(&schema, &[order(1, "NEW")]).await,
            Err(DestinationError::Unavailable(_))
        ));
        dest.append(&schema, &[order(1, "NEW")]).await.unwrap();
        assert_eq!(dest.write_calls(), 1);
    }
}
