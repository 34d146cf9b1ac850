//! Application layer of the USER context.

pub mod command_handlers;
pub mod query_handlers;
