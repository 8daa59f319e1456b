use crate::query::{
    ast::{
        common::TableRef,
        expr::{BinaryOp, BinaryOperator, Expr},
        merge::{AliasedTable, Assignment, MatchedAction, Merge, MergeInsert},
    },
    cast, key_equality, qualified,
};
use model::core::data_type::DataType;

const TARGET_ALIAS: &str = "t";
const SOURCE_ALIAS: &str = "s";

#[derive(Debug, Clone)]
pub struct MergeBuilder {
    ast: Merge,
}

impl MergeBuilder {
    pub fn new(target: TableRef, source: TableRef) -> Self {
        Self {
            ast: Merge {
                target: AliasedTable {
                    table: target,
                    alias: None,
                },
                source: AliasedTable {
                    table: source,
                    alias: None,
                },
                on: Expr::Literal("FALSE".to_string()),
                matched: MatchedAction::DoNothing,
                insert: None,
            },
        }
    }

    /// Upsert from a text staging table: rows are matched on `key`, every
    /// non-key column is overwritten, and each staged value is cast to the
    /// column's target type.
    pub fn upsert_from_stage(
        target: TableRef,
        stage: TableRef,
        key: &[String],
        columns: &[(String, DataType)],
    ) -> Self {
        let type_of = |name: &str| {
            columns
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t.clone())
                .unwrap_or(DataType::Text)
        };

        let assignments: Vec<Assignment> = columns
            .iter()
            .filter(|(name, _)| !key.contains(name))
            .map(|(name, data_type)| Assignment {
                column: name.clone(),
                value: staged(name, data_type),
            })
            .collect();

        let keys: Vec<(String, Expr)> = key
            .iter()
            .map(|k| (k.clone(), staged(k, &type_of(k))))
            .collect();

        let builder = Self::new(target, stage)
            .aliases(TARGET_ALIAS, SOURCE_ALIAS)
            .on(keyed_on(keys))
            .insert(
                columns.iter().map(|(name, _)| name.clone()).collect(),
                columns.iter().map(|(name, t)| staged(name, t)).collect(),
            );

        // Key-only tables have nothing to overwrite.
        if assignments.is_empty() {
            builder
        } else {
            builder.update(assignments)
        }
    }

    pub fn aliases(mut self, target: &str, source: &str) -> Self {
        self.ast.target.alias = Some(target.to_string());
        self.ast.source.alias = Some(source.to_string());
        self
    }

    pub fn on(mut self, condition: Expr) -> Self {
        self.ast.on = condition;
        self
    }

    pub fn update(mut self, assignments: Vec<Assignment>) -> Self {
        self.ast.matched = MatchedAction::Update(assignments);
        self
    }

    pub fn insert(mut self, columns: Vec<String>, values: Vec<Expr>) -> Self {
        self.ast.insert = Some(MergeInsert { columns, values });
        self
    }

    pub fn build(self) -> Merge {
        self.ast
    }
}

fn staged(name: &str, data_type: &DataType) -> Expr {
    match data_type {
        DataType::Text => qualified(SOURCE_ALIAS, name),
        other => cast(qualified(SOURCE_ALIAS, name), other.clone()),
    }
}

/// `t.k = s.k` per key column, casting the staged side when the key is typed.
fn keyed_on(keys: Vec<(String, Expr)>) -> Expr {
    if keys.iter().all(|(_, e)| matches!(e, Expr::Identifier(_))) {
        let names: Vec<String> = keys.into_iter().map(|(k, _)| k).collect();
        return key_equality(TARGET_ALIAS, SOURCE_ALIAS, &names);
    }

    keys.into_iter()
        .map(|(k, right)| {
            Expr::BinaryOp(Box::new(BinaryOp {
                left: qualified(TARGET_ALIAS, &k),
                op: BinaryOperator::Eq,
                right,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{dialect::Postgres, renderer::render_with, table};

    #[test]
    fn test_upsert_from_stage_casts_and_skips_key_updates() {
        let ast = MergeBuilder::upsert_from_stage(
            table("daily_spend"),
            table("_stage_daily_spend"),
            &["date".to_string(), "source_id".to_string()],
            &[
                ("date".to_string(), DataType::Date),
                ("source_id".to_string(), DataType::Text),
                ("cost".to_string(), DataType::Double),
            ],
        )
        .build();

        let (sql, params) = render_with(&ast, &Postgres);
        assert!(params.is_empty());
        assert_eq!(
            sql,
            concat!(
                "MERGE INTO \"daily_spend\" AS \"t\" USING \"_stage_daily_spend\" AS \"s\" ",
                "ON ((\"t\".\"date\" = CAST(\"s\".\"date\" AS DATE)) AND (\"t\".\"source_id\" = \"s\".\"source_id\")) ",
                "WHEN MATCHED THEN UPDATE SET \"cost\" = CAST(\"s\".\"cost\" AS DOUBLE PRECISION) ",
                "WHEN NOT MATCHED THEN INSERT (\"date\", \"source_id\", \"cost\") ",
                "VALUES (CAST(\"s\".\"date\" AS DATE), \"s\".\"source_id\", CAST(\"s\".\"cost\" AS DOUBLE PRECISION));"
            )
        );
    }

    #[test]
    fn test_key_only_table_does_nothing_on_match() {
        let ast = MergeBuilder::upsert_from_stage(
            table("tags"),
            table("_stage_tags"),
            &["id".to_string()],
            &[("id".to_string(), DataType::Text)],
        )
        .build();

        assert!(matches!(ast.matched, MatchedAction::DoNothing));
        let (sql, _) = render_with(&ast, &Postgres);
        assert!(sql.contains("ON (\"t\".\"id\" = \"s\".\"id\")"));
    }
}
