use crate::query::{
    ast::create_table::CreateTable,
    renderer::{Render, Renderer},
};

impl Render for CreateTable {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("CREATE ");
        if self.temp {
            r.sql.push_str("TEMP ");
        }
        r.sql.push_str("TABLE ");
        if self.if_not_exists {
            r.sql.push_str("IF NOT EXISTS ");
        }
        r.render_table_ref(&self.table);
        r.sql.push_str(" (");

        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                r.sql.push_str(", ");
            }
            r.render_column_def(column);
        }

        if !self.primary_key.is_empty() {
            r.sql.push_str(", PRIMARY KEY (");
            r.push_quoted_list(&self.primary_key);
            r.sql.push(')');
        }
        r.sql.push(')');

        if self.temp {
            r.sql.push_str(" ON COMMIT DROP");
        }
        r.sql.push(';');
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{
        ast::create_table::{ColumnDef, CreateTable},
        dialect::Postgres,
        renderer::render_with,
        table,
    };
    use model::core::data_type::DataType;

    #[test]
    fn test_render_create_table_with_key() {
        let ast = CreateTable {
            table: table("daily_spend"),
            columns: vec![
                ColumnDef {
                    name: "date".to_string(),
                    data_type: DataType::Date,
                    is_nullable: false,
                },
                ColumnDef {
                    name: "source_id".to_string(),
                    data_type: DataType::Text,
                    is_nullable: false,
                },
                ColumnDef::nullable("cost", DataType::Double),
            ],
            primary_key: vec!["date".to_string(), "source_id".to_string()],
            if_not_exists: true,
            temp: false,
        };

        let (sql, params) = render_with(&ast, &Postgres);
        assert!(params.is_empty());
        assert_eq!(
            sql,
            concat!(
                "CREATE TABLE IF NOT EXISTS \"daily_spend\" (",
                "\"date\" DATE NOT NULL, \"source_id\" TEXT NOT NULL, \"cost\" DOUBLE PRECISION, ",
                "PRIMARY KEY (\"date\", \"source_id\"));"
            )
        );
    }

    #[test]
    fn test_render_temp_staging_table() {
        let ast = CreateTable {
            table: table("_stage_orders"),
            columns: vec![ColumnDef::nullable("id", DataType::Text)],
            temp: true,
            ..Default::default()
        };

        let (sql, _) = render_with(&ast, &Postgres);
        assert_eq!(
            sql,
            "CREATE TEMP TABLE \"_stage_orders\" (\"id\" TEXT) ON COMMIT DROP;"
        );
    }
}
