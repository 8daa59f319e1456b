//! Defines the core rendering trait and context for converting AST to SQL.

use crate::query::{
    ast::{common::TableRef, create_table::ColumnDef},
    dialect::Dialect,
};
use model::core::value::Value;

pub mod alter_table;
pub mod create_table;
pub mod drop_table;
pub mod expr;
pub mod insert;
pub mod merge;
pub mod rename_table;
pub mod select;

/// A trait for any AST node that can be rendered into a SQL string.
pub trait Render {
    fn render(&self, renderer: &mut Renderer);
}

/// A context that holds the state during the rendering process.
///
/// It accumulates the SQL string and the parameters, and provides
/// access to the dialect for syntax-specific details.
pub struct Renderer<'a> {
    pub sql: String,
    pub params: Vec<Value>,
    pub dialect: &'a dyn Dialect,
}

impl<'a> Renderer<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            dialect,
        }
    }

    /// Consumes the renderer and returns the final SQL string and parameters.
    pub fn finish(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    pub fn add_param(&mut self, value: Value) {
        self.params.push(value);
        let placeholder = self.dialect.get_placeholder(self.params.len() - 1);
        self.sql.push_str(&placeholder);
    }

    pub fn render_table_ref(&mut self, table: &TableRef) {
        if let Some(schema) = &table.schema {
            self.sql.push_str(&self.dialect.quote_identifier(schema));
            self.sql.push('.');
        }
        self.sql.push_str(&self.dialect.quote_identifier(&table.name));
    }

    pub fn render_column_def(&mut self, column: &ColumnDef) {
        self.sql.push_str(&self.dialect.quote_identifier(&column.name));
        self.sql.push(' ');
        self.sql
            .push_str(&self.dialect.render_data_type(&column.data_type));
        if !column.is_nullable {
            self.sql.push_str(" NOT NULL");
        }
    }

    pub fn push_quoted_list(&mut self, names: &[String]) {
        let quoted: Vec<String> = names
            .iter()
            .map(|n| self.dialect.quote_identifier(n))
            .collect();
        self.sql.push_str(&quoted.join(", "));
    }
}

/// Renders any statement with the given dialect.
pub fn render_with<T: Render>(node: &T, dialect: &dyn Dialect) -> (String, Vec<Value>) {
    let mut renderer = Renderer::new(dialect);
    node.render(&mut renderer);
    renderer.finish()
}
