pub mod csv;
pub mod drop;
