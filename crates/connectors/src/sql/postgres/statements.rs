//! SQL for the Postgres destination, rendered through the planner.
//!
//! Rows travel as text: they are bound into a temporary staging table whose
//! columns are all TEXT and cast to the target types on the way out.

use engine_core::destination::TableSchema;
use model::core::{data_type::DataType, value::Value};
use planner::query::{
    ast::{
        alter_table::{AlterAction, AlterTable},
        common::TableRef,
        create_table::{ColumnDef, CreateTable},
        drop_table::DropTable,
        expr::Expr,
        insert::Insert,
        rename_table::{Relation, Rename},
        select::{FromClause, Select},
    },
    builder::merge::MergeBuilder,
    cast,
    dialect::Postgres,
    qualified,
    renderer::render_with,
};

/// Bind parameter limit of the Postgres wire protocol.
pub(crate) const MAX_PARAMS: usize = 65_535;

const STAGE_ALIAS: &str = "s";

pub(crate) struct Statements {
    schema: Option<String>,
}

impl Statements {
    pub(crate) fn new(schema: Option<String>) -> Self {
        Statements { schema }
    }

    pub(crate) fn table_ref(&self, name: &str) -> TableRef {
        TableRef {
            schema: self.schema.clone(),
            name: name.to_string(),
        }
    }

    pub(crate) fn stage_ref(table: &str) -> TableRef {
        TableRef {
            schema: None,
            name: format!("_stage_{table}"),
        }
    }

    pub(crate) fn shadow_name(table: &str) -> String {
        format!("{table}__shadow")
    }

    pub(crate) fn create_table(&self, name: &str, schema: &TableSchema) -> String {
        let ast = CreateTable {
            table: self.table_ref(name),
            columns: schema
                .columns
                .iter()
                .map(|c| ColumnDef::nullable(&c.name, c.data_type.clone()))
                .collect(),
            primary_key: schema.primary_key.clone(),
            if_not_exists: true,
            temp: false,
        };
        render_with(&ast, &Postgres).0
    }

    pub(crate) fn add_columns(&self, table: &str, columns: &[(String, DataType)]) -> String {
        let ast = AlterTable {
            table: self.table_ref(table),
            actions: columns
                .iter()
                .map(|(name, data_type)| AlterAction::AddColumn {
                    column: ColumnDef::nullable(name, data_type.clone()),
                    if_not_exists: true,
                })
                .collect(),
        };
        render_with(&ast, &Postgres).0
    }

    pub(crate) fn create_stage(schema: &TableSchema) -> String {
        let ast = CreateTable {
            table: Self::stage_ref(&schema.table),
            columns: schema
                .columns
                .iter()
                .map(|c| ColumnDef::nullable(&c.name, DataType::Text))
                .collect(),
            primary_key: Vec::new(),
            if_not_exists: false,
            temp: true,
        };
        render_with(&ast, &Postgres).0
    }

    /// Multi-row insert into the staging table. Returns the SQL and the text
    /// form of every bound value, `None` standing for NULL.
    pub(crate) fn stage_rows(schema: &TableSchema, rows: &[Vec<Value>]) -> (String, Vec<Option<String>>) {
        let ast = Insert {
            table: Self::stage_ref(&schema.table),
            columns: schema.column_names(),
            values: rows
                .iter()
                .map(|row| row.iter().cloned().map(Expr::Value).collect())
                .collect(),
            select: None,
        };
        let (sql, params) = render_with(&ast, &Postgres);
        (sql, params.iter().map(Value::to_text).collect())
    }

    /// Rows per staging insert so one statement stays under the bind limit.
    pub(crate) fn rows_per_chunk(column_count: usize) -> usize {
        (MAX_PARAMS / column_count.max(1)).max(1)
    }

    pub(crate) fn insert_from_stage(&self, target: &str, schema: &TableSchema) -> String {
        let ast = Insert {
            table: self.table_ref(target),
            columns: schema.column_names(),
            values: Vec::new(),
            select: Some(Select {
                columns: schema
                    .columns
                    .iter()
                    .map(|c| staged(&c.name, &c.data_type))
                    .collect(),
                from: Some(FromClause {
                    table: Self::stage_ref(&schema.table),
                    alias: Some(STAGE_ALIAS.to_string()),
                }),
            }),
        };
        render_with(&ast, &Postgres).0
    }

    pub(crate) fn merge_from_stage(&self, schema: &TableSchema) -> String {
        let columns: Vec<(String, DataType)> = schema
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.data_type.clone()))
            .collect();
        let ast = MergeBuilder::upsert_from_stage(
            self.table_ref(&schema.table),
            Self::stage_ref(&schema.table),
            &schema.primary_key,
            &columns,
        )
        .build();
        render_with(&ast, &Postgres).0
    }

    pub(crate) fn drop_table(&self, name: &str) -> String {
        render_with(&DropTable::if_exists(self.table_ref(name)), &Postgres).0
    }

    pub(crate) fn rename_table(&self, from: &str, to: &str) -> String {
        let ast = Rename {
            relation: Relation::Table,
            target: self.table_ref(from),
            new_name: to.to_string(),
        };
        render_with(&ast, &Postgres).0
    }

    /// Renames the primary key index that followed a renamed table, so the
    /// next shadow can reuse its default name.
    pub(crate) fn rename_primary_key(&self, from: &str, to: &str) -> String {
        let ast = Rename {
            relation: Relation::Index,
            target: self.table_ref(&format!("{from}_pkey")),
            new_name: format!("{to}_pkey"),
        };
        render_with(&ast, &Postgres).0
    }

    pub(crate) fn count_rows(&self, table: &str) -> String {
        let mut sql = String::from("SELECT COUNT(*) FROM ");
        if let Some(schema) = &self.schema {
            sql.push_str(&format!("\"{}\".", schema.replace('"', "\"\"")));
        }
        sql.push_str(&format!("\"{}\"", table.replace('"', "\"\"")));
        sql
    }
}

fn staged(name: &str, data_type: &DataType) -> Expr {
    match data_type {
        DataType::Text => qualified(STAGE_ALIAS, name),
        other => cast(qualified(STAGE_ALIAS, name), other.clone()),
    }
}
