//! Domain layer of the USER context.

pub mod commands;
pub mod events;
pub mod password;
pub mod projection;
