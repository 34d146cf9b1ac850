//! Domain layer of the TODO context.

pub mod commands;
pub mod events;
pub mod projection;
