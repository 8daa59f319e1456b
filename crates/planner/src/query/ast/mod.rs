pub mod alter_table;
pub mod common;
pub mod create_table;
pub mod drop_table;
pub mod expr;
pub mod insert;
pub mod merge;
pub mod rename_table;
pub mod select;
