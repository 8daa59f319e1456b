pub mod key;
pub mod marker;
