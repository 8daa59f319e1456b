pub mod destination;
pub mod error;
pub mod progress;
pub mod retry;
pub mod source;
pub mod state;
