//! Relational sink contract the loader writes through.

use crate::error::DestinationError;
use async_trait::async_trait;
use model::{
    core::data_type::DataType, records::record::Record, source::descriptor::ColumnSchema,
};

pub mod memory;

/// Shape of a destination table as the loader wants it.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(table: &str, primary_key: Vec<String>) -> Self {
        TableSchema {
            table: table.to_string(),
            columns: Vec::new(),
            primary_key,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Appends a column unless one with that name already exists.
    pub fn add_column(&mut self, name: &str, data_type: DataType) {
        if !self.has_column(name) {
            self.columns.push(ColumnSchema {
                name: name.to_string(),
                data_type,
            });
        }
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|k| k == column)
    }

    /// The schema a new table is created with. Key columns no record has
    /// carried yet, as in an empty replace, are created as text.
    pub fn for_creation(&self) -> TableSchema {
        let mut created = self.clone();
        for key in &self.primary_key {
            created.add_column(key, DataType::Text);
        }
        created
    }

    /// Reconciles `incoming` with an existing table: existing columns keep their
    /// type, unseen columns are appended. Returns the columns to add.
    pub fn evolve(&mut self, incoming: &TableSchema) -> Result<Vec<ColumnSchema>, DestinationError> {
        let mut added = Vec::new();
        for column in &incoming.columns {
            match self.column(&column.name) {
                Some(existing) if !existing.data_type.accepts(&column.data_type) => {
                    return Err(DestinationError::SchemaConflict {
                        table: self.table.clone(),
                        column: column.name.clone(),
                        existing: existing.data_type.to_string(),
                        incoming: column.data_type.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    self.columns.push(column.clone());
                    added.push(column.clone());
                }
            }
        }
        Ok(added)
    }

    /// Projects a record onto the table's columns, in column order, with
    /// absent columns as NULL.
    pub fn project(&self, record: &Record) -> Record {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), record.get_value(&c.name)))
            .collect()
    }
}

/// Any relational store that can append, upsert by key, atomically replace a
/// table, and add nullable columns on write.
#[async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    /// Creates the table if needed, or adds the columns it lacks. Existing
    /// columns are never dropped or narrowed. Returns the effective schema.
    async fn ensure_table(&self, schema: &TableSchema) -> Result<TableSchema, DestinationError>;

    async fn append(&self, schema: &TableSchema, records: &[Record]) -> Result<usize, DestinationError>;

    /// Inserts or overwrites rows matched on `schema.primary_key`. The batch is
    /// applied in one transaction.
    async fn upsert(&self, schema: &TableSchema, records: &[Record]) -> Result<usize, DestinationError>;

    /// Swaps the whole table for `records`; readers see either the old or the
    /// new contents, never a mix.
    async fn replace(&self, schema: &TableSchema, records: &[Record]) -> Result<usize, DestinationError>;

    async fn row_count(&self, table: &str) -> Result<u64, DestinationError>;
}
