use crate::query::ast::common::TableRef;

/// `DROP TABLE [IF EXISTS] <table>`.
#[derive(Debug, Clone)]
pub struct DropTable {
    pub table: TableRef,
    pub if_exists: bool,
}

impl DropTable {
    pub fn if_exists(table: TableRef) -> Self {
        DropTable {
            table,
            if_exists: true,
        }
    }
}
