use crate::query::{
    ast::alter_table::{AlterAction, AlterTable},
    renderer::{Render, Renderer},
};

impl Render for AlterTable {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("ALTER TABLE ");
        r.render_table_ref(&self.table);
        r.sql.push(' ');

        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                r.sql.push_str(", ");
            }
            match action {
                AlterAction::AddColumn {
                    column,
                    if_not_exists,
                } => {
                    r.sql.push_str("ADD COLUMN ");
                    if *if_not_exists {
                        r.sql.push_str("IF NOT EXISTS ");
                    }
                    r.render_column_def(column);
                }
            }
        }
        r.sql.push(';');
    }
}
