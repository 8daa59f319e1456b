use crate::query::{
    ast::expr::{BinaryOperator, Expr},
    renderer::{Render, Renderer},
};

impl Render for Expr {
    fn render(&self, r: &mut Renderer) {
        match self {
            Expr::Identifier(ident) => {
                if let Some(qualifier) = &ident.qualifier {
                    r.sql.push_str(&r.dialect.quote_identifier(qualifier));
                    r.sql.push('.');
                }
                r.sql.push_str(&r.dialect.quote_identifier(&ident.name));
            }
            Expr::Value(value) => r.add_param(value.clone()),
            Expr::Literal(raw) => r.sql.push_str(raw),
            Expr::BinaryOp(op) => {
                r.sql.push('(');
                op.left.render(r);
                r.sql.push_str(match op.op {
                    BinaryOperator::Eq => " = ",
                    BinaryOperator::And => " AND ",
                });
                op.right.render(r);
                r.sql.push(')');
            }
            Expr::Cast { expr, data_type } => {
                r.sql.push_str("CAST(");
                expr.render(r);
                r.sql.push_str(" AS ");
                r.sql.push_str(&r.dialect.render_data_type(data_type));
                r.sql.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{
        cast,
        dialect::Postgres,
        key_equality, qualified,
        renderer::render_with,
    };
    use model::core::data_type::DataType;

    #[test]
    fn test_render_cast() {
        let expr = cast(qualified("s", "cost"), DataType::Double);
        let (sql, params) = render_with(&expr, &Postgres);
        assert_eq!(sql, r#"CAST("s"."cost" AS DOUBLE PRECISION)"#);
        assert!(params.is_empty());
    }

    #[test]
    fn test_render_composite_key_equality() {
        let expr = key_equality("t", "s", &["date".to_string(), "source_id".to_string()]);
        let (sql, _) = render_with(&expr, &Postgres);
        assert_eq!(
            sql,
            r#"(("t"."date" = "s"."date") AND ("t"."source_id" = "s"."source_id"))"#
        );
    }
}
