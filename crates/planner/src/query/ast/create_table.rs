//! Defines the AST for a CREATE TABLE statement.

use crate::query::ast::common::TableRef;
use model::core::data_type::DataType;

#[derive(Debug, Clone, Default)]
pub struct CreateTable {
    pub table: TableRef,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub if_not_exists: bool,
    /// `CREATE TEMP TABLE ... ON COMMIT DROP`.
    pub temp: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub is_nullable: bool,
}

impl ColumnDef {
    pub fn nullable(name: &str, data_type: DataType) -> Self {
        ColumnDef {
            name: name.to_string(),
            data_type,
            is_nullable: true,
        }
    }
}
