use crate::query::{
    ast::rename_table::{Relation, Rename},
    renderer::{Render, Renderer},
};

impl Render for Rename {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str(match self.relation {
            Relation::Table => "ALTER TABLE ",
            Relation::Index => "ALTER INDEX IF EXISTS ",
        });
        r.render_table_ref(&self.target);
        r.sql.push_str(" RENAME TO ");
        r.sql.push_str(&r.dialect.quote_identifier(&self.new_name));
        r.sql.push(';');
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{
        ast::{
            common::TableRef,
            rename_table::{Relation, Rename},
        },
        dialect::Postgres,
        renderer::render_with,
    };

    fn shadow(name: &str) -> TableRef {
        TableRef {
            schema: Some("public".to_string()),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_render_rename_table() {
        let ast = Rename {
            relation: Relation::Table,
            target: shadow("feature_flags__shadow"),
            new_name: "feature_flags".to_string(),
        };
        let (sql, _) = render_with(&ast, &Postgres);
        assert_eq!(
            sql,
            r#"ALTER TABLE "public"."feature_flags__shadow" RENAME TO "feature_flags";"#
        );
    }

    #[test]
    fn test_render_rename_index() {
        let ast = Rename {
            relation: Relation::Index,
            target: shadow("feature_flags__shadow_pkey"),
            new_name: "feature_flags_pkey".to_string(),
        };
        let (sql, _) = render_with(&ast, &Postgres);
        assert_eq!(
            sql,
            r#"ALTER INDEX IF EXISTS "public"."feature_flags__shadow_pkey" RENAME TO "feature_flags_pkey";"#
        );
    }
}
