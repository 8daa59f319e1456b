pub mod core;
pub mod cursor;
pub mod records;
pub mod source;
pub mod summary;
