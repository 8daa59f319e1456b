use crate::query::ast::{
    common::TableRef,
    expr::{BinaryOp, BinaryOperator, Expr, Ident},
};
use model::core::data_type::DataType;

pub mod ast;
pub mod builder;
pub mod dialect;
pub mod renderer;

pub fn ident(name: &str) -> Expr {
    Expr::Identifier(Ident {
        qualifier: None,
        name: name.to_string(),
    })
}

pub fn qualified(qualifier: &str, name: &str) -> Expr {
    Expr::Identifier(Ident {
        qualifier: Some(qualifier.to_string()),
        name: name.to_string(),
    })
}

pub fn cast(expr: Expr, data_type: DataType) -> Expr {
    Expr::Cast {
        expr: Box::new(expr),
        data_type,
    }
}

pub fn table(name: &str) -> TableRef {
    TableRef {
        schema: None,
        name: name.to_string(),
    }
}

/// Joins `t.col = s.col` for every column with AND.
pub fn key_equality(target_alias: &str, source_alias: &str, columns: &[String]) -> Expr {
    columns
        .iter()
        .map(|col| {
            Expr::BinaryOp(Box::new(BinaryOp {
                left: qualified(target_alias, col),
                op: BinaryOperator::Eq,
                right: qualified(source_alias, col),
            }))
        })
        .reduce(|acc, next| {
            Expr::BinaryOp(Box::new(BinaryOp {
                left: acc,
                op: BinaryOperator::And,
                right: next,
            }))
        })
        .unwrap_or_else(|| Expr::Literal("FALSE".to_string()))
}
