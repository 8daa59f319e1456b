//! `MERGE` of staged rows into a target table.

use crate::query::ast::{common::TableRef, expr::Expr};

#[derive(Debug, Clone)]
pub struct Merge {
    pub target: AliasedTable,
    pub source: AliasedTable,
    pub on: Expr,
    pub matched: MatchedAction,
    /// Omitted means unmatched source rows are ignored.
    pub insert: Option<MergeInsert>,
}

#[derive(Debug, Clone)]
pub struct AliasedTable {
    pub table: TableRef,
    pub alias: Option<String>,
}

/// What happens to a target row whose key is already present.
#[derive(Debug, Clone)]
pub enum MatchedAction {
    Update(Vec<Assignment>),
    DoNothing,
}

#[derive(Debug, Clone)]
pub struct MergeInsert {
    pub columns: Vec<String>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: String,
    pub value: Expr,
}
