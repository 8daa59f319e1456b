use crate::query::ast::common::TableRef;

/// `ALTER TABLE|INDEX <relation> RENAME TO <new_name>`; the new name is never
/// schema qualified.
#[derive(Debug, Clone)]
pub struct Rename {
    pub relation: Relation,
    pub target: TableRef,
    pub new_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Table,
    /// Renaming a missing index is a no-op (`IF EXISTS`).
    Index,
}
