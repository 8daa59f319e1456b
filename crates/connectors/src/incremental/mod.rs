//! Progress tracking shared by the extractors.

pub mod batch;
pub mod row;
