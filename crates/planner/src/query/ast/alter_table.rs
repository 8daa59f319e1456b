use crate::query::ast::{common::TableRef, create_table::ColumnDef};

#[derive(Debug, Clone)]
pub struct AlterTable {
    pub table: TableRef,
    pub actions: Vec<AlterAction>,
}

#[derive(Debug, Clone)]
pub enum AlterAction {
    AddColumn { column: ColumnDef, if_not_exists: bool },
}
