//! Defines the AST for an INSERT statement.

use crate::query::ast::{common::TableRef, expr::Expr, select::Select};

/// Either multi-row `VALUES` or a `SELECT` source; `values` wins when both are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insert {
    pub table: TableRef,
    pub columns: Vec<String>,
    /// The rows of values to be inserted. Each inner vector represents a single row.
    pub values: Vec<Vec<Expr>>,
    pub select: Option<Select>,
}
