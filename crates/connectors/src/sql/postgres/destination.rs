use crate::sql::postgres::{
    connect::{connect_client, db_error},
    statements::Statements,
};
use async_trait::async_trait;
use engine_core::{
    destination::{Destination, TableSchema},
    error::DestinationError,
};
use model::{
    core::{data_type::DataType, value::Value},
    records::record::Record,
};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_postgres::{Client, Transaction, types::ToSql};
use tracing::{debug, info, warn};

const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");
const QUERY_TABLE_EXISTS_SQL: &str = include_str!("sql/table_exists.sql");
const UNDEFINED_TABLE: &str = "42P01";

/// Warehouse sink on Postgres. Every write runs in one transaction, so a
/// failed batch leaves the table as it was.
///
/// A destination opened from a connection string reconnects when it finds
/// its client closed, so a retried write after an outage gets a fresh
/// connection.
#[derive(Clone)]
pub struct PostgresDestination {
    client: Arc<Mutex<Client>>,
    statements: Arc<Statements>,
    schema: Option<String>,
    url: Option<String>,
}

impl PostgresDestination {
    pub async fn connect(url: &str) -> Result<Self, DestinationError> {
        let client = connect_client(url).await?;
        info!("Connected to Postgres destination");
        let mut destination = Self::from_client(client, None);
        destination.url = Some(url.to_string());
        Ok(destination)
    }

    pub fn from_client(client: Client, schema: Option<String>) -> Self {
        PostgresDestination {
            client: Arc::new(Mutex::new(client)),
            statements: Arc::new(Statements::new(schema.clone())),
            schema,
            url: None,
        }
    }

    /// Locks the client, replacing it first if its connection has gone away.
    async fn client(&self) -> Result<MutexGuard<'_, Client>, DestinationError> {
        let mut client = self.client.lock().await;
        if let Some(url) = reconnect_url(client.is_closed(), self.url.as_deref()) {
            warn!("Postgres connection closed, reconnecting");
            *client = connect_client(url).await?;
            info!("Reconnected to Postgres destination");
        }
        Ok(client)
    }

    async fn existing_columns(&self, client: &Client, table: &str) -> Result<Vec<(String, DataType)>, DestinationError> {
        let rows = client
            .query(QUERY_TABLE_COLUMNS_SQL, &[&table, &self.schema])
            .await
            .map_err(db_error)?;
        rows.iter()
            .map(|row| {
                let name: String = row.try_get(0).map_err(db_error)?;
                let type_name: String = row.try_get(1).map_err(db_error)?;
                Ok((name, DataType::from_postgres(&type_name)))
            })
            .collect()
    }

    /// Creates the stage and fills it with `records` projected on `schema`.
    async fn stage(tx: &Transaction<'_>, schema: &TableSchema, records: &[Record]) -> Result<(), DestinationError> {
        tx.batch_execute(&Statements::create_stage(schema))
            .await
            .map_err(db_error)?;

        let rows: Vec<Vec<Value>> = records
            .iter()
            .map(|r| {
                schema
                    .columns
                    .iter()
                    .map(|c| r.get_value(&c.name))
                    .collect()
            })
            .collect();

        for chunk in rows.chunks(Statements::rows_per_chunk(schema.columns.len())) {
            let (sql, params) = Statements::stage_rows(schema, chunk);
            let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            tx.execute(sql.as_str(), &refs).await.map_err(db_error)?;
        }
        debug!(table = %schema.table, rows = rows.len(), "Staged rows");
        Ok(())
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn ensure_table(&self, schema: &TableSchema) -> Result<TableSchema, DestinationError> {
        let client = self.client().await?;
        let existing = self.existing_columns(&client, &schema.table).await?;

        if existing.is_empty() {
            let created = schema.for_creation();
            client
                .batch_execute(&self.statements.create_table(&created.table, &created))
                .await
                .map_err(db_error)?;
            info!(table = %created.table, columns = created.columns.len(), "Created table");
            return Ok(created);
        }

        let mut current = TableSchema::new(&schema.table, schema.primary_key.clone());
        for (name, data_type) in existing {
            current.add_column(&name, data_type);
        }
        let added = current.evolve(schema)?;
        if !added.is_empty() {
            let columns: Vec<(String, DataType)> = added
                .iter()
                .map(|c| (c.name.clone(), c.data_type.clone()))
                .collect();
            client
                .batch_execute(&self.statements.add_columns(&schema.table, &columns))
                .await
                .map_err(db_error)?;
            info!(
                table = %schema.table,
                added = ?columns.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
                "Added columns"
            );
        }
        Ok(current)
    }

    async fn append(&self, schema: &TableSchema, records: &[Record]) -> Result<usize, DestinationError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(db_error)?;
        Self::stage(&tx, schema, records).await?;
        let inserted = tx
            .execute(self.statements.insert_from_stage(&schema.table, schema).as_str(), &[])
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(inserted as usize)
    }

    async fn upsert(&self, schema: &TableSchema, records: &[Record]) -> Result<usize, DestinationError> {
        if schema.primary_key.is_empty() {
            return Err(DestinationError::MissingKey {
                table: schema.table.clone(),
            });
        }
        if records.is_empty() {
            return Ok(0);
        }
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(db_error)?;
        Self::stage(&tx, schema, records).await?;
        let merged = tx
            .execute(self.statements.merge_from_stage(schema).as_str(), &[])
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        Ok(merged as usize)
    }

    async fn replace(&self, schema: &TableSchema, records: &[Record]) -> Result<usize, DestinationError> {
        let shadow = Statements::shadow_name(&schema.table);
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(db_error)?;

        tx.batch_execute(&self.statements.drop_table(&shadow))
            .await
            .map_err(db_error)?;
        tx.batch_execute(&self.statements.create_table(&shadow, schema))
            .await
            .map_err(db_error)?;

        let mut inserted = 0;
        if !records.is_empty() {
            Self::stage(&tx, schema, records).await?;
            inserted = tx
                .execute(self.statements.insert_from_stage(&shadow, schema).as_str(), &[])
                .await
                .map_err(db_error)?;
        }

        tx.batch_execute(&self.statements.drop_table(&schema.table))
            .await
            .map_err(db_error)?;
        tx.batch_execute(&self.statements.rename_table(&shadow, &schema.table))
            .await
            .map_err(db_error)?;
        tx.batch_execute(&self.statements.rename_primary_key(&shadow, &schema.table))
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        info!(table = %schema.table, rows = inserted, "Replaced table contents");
        Ok(inserted as usize)
    }

    async fn row_count(&self, table: &str) -> Result<u64, DestinationError> {
        let client = self.client().await?;
        let exists: bool = client
            .query_one(QUERY_TABLE_EXISTS_SQL, &[&table, &self.schema])
            .await
            .and_then(|row| row.try_get(0))
            .map_err(db_error)?;
        if !exists {
            return Ok(0);
        }
        match client.query_one(self.statements.count_rows(table).as_str(), &[]).await {
            Ok(row) => {
                let count: i64 = row.try_get(0).map_err(db_error)?;
                Ok(count.max(0) as u64)
            }
            Err(err) if err.code().map(|c| c.code()) == Some(UNDEFINED_TABLE) => Ok(0),
            Err(err) => Err(db_error(err)),
        }
    }
}

/// Connection string to reopen from, when the client is closed and the
/// destination knows how to reconnect.
fn reconnect_url(closed: bool, url: Option<&str>) -> Option<&str> {
    if closed { url } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnects_only_closed_clients_opened_from_a_url() {
        let url = "postgres://marketsync@localhost/warehouse";
        assert_eq!(reconnect_url(true, Some(url)), Some(url));
        assert_eq!(reconnect_url(false, Some(url)), None);
        assert_eq!(reconnect_url(true, None), None);
    }
}
