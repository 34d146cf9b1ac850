//! ex-horse: USER bounded context.
//!
//! Responsible for account sign-up, sign-in and profile changes, all
//! written as events on the `USER` aggregate.

pub mod application;
pub mod domain;
