//! Application layer of the TODO context.

pub mod command_handlers;
pub mod query_handlers;
