//! ex-horse Core: shared event-sourcing abstractions.
//!
//! This crate defines the event record, the projected entity document, the
//! pure event folder, and the storage traits every backend implements. It
//! contains no infrastructure code.

pub mod clock;
pub mod command;
pub mod entity;
pub mod error;
pub mod event;
pub mod fold;
pub mod repository;
