pub mod connect;
pub mod destination;
mod statements;
