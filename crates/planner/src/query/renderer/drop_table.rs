use crate::query::{
    ast::drop_table::DropTable,
    renderer::{Render, Renderer},
};

impl Render for DropTable {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str(if self.if_exists {
            "DROP TABLE IF EXISTS "
        } else {
            "DROP TABLE "
        });
        r.render_table_ref(&self.table);
        r.sql.push(';');
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{
        ast::{common::TableRef, drop_table::DropTable},
        dialect::Postgres,
        renderer::render_with,
        table,
    };

    #[test]
    fn test_render_drop_shadow() {
        let ast = DropTable::if_exists(table("feature_flags__shadow"));
        let (sql, params) = render_with(&ast, &Postgres);
        assert!(params.is_empty());
        assert_eq!(sql, r#"DROP TABLE IF EXISTS "feature_flags__shadow";"#);
    }

    #[test]
    fn test_render_plain_drop_is_schema_qualified() {
        let ast = DropTable {
            table: TableRef {
                schema: Some("marketing".to_string()),
                name: "feature_flags".to_string(),
            },
            if_exists: false,
        };
        let (sql, _) = render_with(&ast, &Postgres);
        assert_eq!(sql, r#"DROP TABLE "marketing"."feature_flags";"#);
    }
}
