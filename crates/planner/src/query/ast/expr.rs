//! Expressions that may appear in a rendered statement.

use model::core::{data_type::DataType, value::Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(Ident),
    /// A bound parameter.
    Value(Value),
    /// Raw SQL emitted as-is.
    Literal(String),
    BinaryOp(Box<BinaryOp>),
    Cast { expr: Box<Expr>, data_type: DataType },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub qualifier: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOp {
    pub left: Expr,
    pub op: BinaryOperator,
    pub right: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    And,
}
