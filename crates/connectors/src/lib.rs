pub mod api;
pub mod builtin;
pub mod file;
pub mod http;
pub mod incremental;
pub mod sql;
