pub mod error;
pub mod options;
pub mod orchestrator;
pub mod registry;
pub mod runner;
