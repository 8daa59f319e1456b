use crate::query::{
    ast::insert::Insert,
    renderer::{Render, Renderer},
};

impl Render for Insert {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("INSERT INTO ");
        r.render_table_ref(&self.table);
        r.sql.push_str(" (");
        r.push_quoted_list(&self.columns);
        r.sql.push(')');

        if !self.values.is_empty() {
            render_values(self, r);
        } else if let Some(select) = &self.select {
            r.sql.push(' ');
            select.render(r);
        }
        r.sql.push(';');
    }
}

fn render_values(insert: &Insert, r: &mut Renderer) {
    r.sql.push_str(" VALUES ");
    for (i, row) in insert.values.iter().enumerate() {
        if i > 0 {
            r.sql.push_str(", ");
        }
        r.sql.push('(');
        for (j, val) in row.iter().enumerate() {
            if j > 0 {
                r.sql.push_str(", ");
            }
            val.render(r);
        }
        r.sql.push(')');
    }
}

#[cfg(test)]
mod tests {
    use model::core::{data_type::DataType, value::Value};

    use crate::query::{
        ast::{
            expr::Expr,
            insert::Insert,
            select::{FromClause, Select},
        },
        cast,
        dialect::Postgres,
        qualified,
        renderer::{Render, Renderer},
        table,
    };

    #[test]
    fn test_render_insert_multi_row() {
        let ast = Insert {
            table: table("_stage_spend"),
            columns: vec!["date".to_string(), "cost".to_string()],
            values: vec![
                vec![
                    Expr::Value(Value::from("2025-01-01")),
                    Expr::Value(Value::from("100")),
                ],
                vec![
                    Expr::Value(Value::from("2025-01-02")),
                    Expr::Value(Value::Null),
                ],
            ],
            select: None,
        };

        let mut renderer = Renderer::new(&Postgres);
        ast.render(&mut renderer);
        let (sql, params) = renderer.finish();

        assert_eq!(
            sql,
            "INSERT INTO \"_stage_spend\" (\"date\", \"cost\") VALUES ($1, $2), ($3, $4);"
        );
        assert_eq!(params.len(), 4);
        assert_eq!(params[3], Value::Null);
    }

    #[test]
    fn test_render_insert_select_with_casts() {
        let ast = Insert {
            table: table("daily_spend"),
            columns: vec!["date".to_string(), "cost".to_string()],
            values: vec![],
            select: Some(Select {
                columns: vec![
                    cast(qualified("s", "date"), DataType::Date),
                    cast(qualified("s", "cost"), DataType::Double),
                ],
                from: Some(FromClause {
                    table: table("_stage_spend"),
                    alias: Some("s".to_string()),
                }),
            }),
        };

        let mut renderer = Renderer::new(&Postgres);
        ast.render(&mut renderer);
        let (sql, params) = renderer.finish();

        assert_eq!(
            sql,
            concat!(
                "INSERT INTO \"daily_spend\" (\"date\", \"cost\") ",
                "SELECT CAST(\"s\".\"date\" AS DATE), CAST(\"s\".\"cost\" AS DOUBLE PRECISION) ",
                "FROM \"_stage_spend\" AS \"s\";"
            )
        );
        assert!(params.is_empty());
    }
}
