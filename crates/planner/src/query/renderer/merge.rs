use crate::query::{
    ast::merge::{AliasedTable, Assignment, MatchedAction, Merge, MergeInsert},
    renderer::{Render, Renderer},
};

impl Render for Merge {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("MERGE INTO ");
        self.target.render(r);
        r.sql.push_str(" USING ");
        self.source.render(r);
        r.sql.push_str(" ON ");
        self.on.render(r);

        r.sql.push_str(" WHEN MATCHED THEN ");
        self.matched.render(r);

        if let Some(insert) = &self.insert {
            r.sql.push_str(" WHEN NOT MATCHED THEN ");
            insert.render(r);
        }
        r.sql.push(';');
    }
}

impl Render for AliasedTable {
    fn render(&self, r: &mut Renderer) {
        r.render_table_ref(&self.table);
        if let Some(alias) = &self.alias {
            r.sql.push_str(" AS ");
            r.sql.push_str(&r.dialect.quote_identifier(alias));
        }
    }
}

impl Render for MatchedAction {
    fn render(&self, r: &mut Renderer) {
        match self {
            MatchedAction::Update(assignments) => {
                r.sql.push_str("UPDATE SET ");
                for (i, assignment) in assignments.iter().enumerate() {
                    if i > 0 {
                        r.sql.push_str(", ");
                    }
                    assignment.render(r);
                }
            }
            MatchedAction::DoNothing => r.sql.push_str("DO NOTHING"),
        }
    }
}

impl Render for MergeInsert {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("INSERT (");
        r.push_quoted_list(&self.columns);
        r.sql.push_str(") VALUES (");
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                r.sql.push_str(", ");
            }
            value.render(r);
        }
        r.sql.push(')');
    }
}

impl Render for Assignment {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str(&r.dialect.quote_identifier(&self.column));
        r.sql.push_str(" = ");
        self.value.render(r);
    }
}
