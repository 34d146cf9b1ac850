//! ex-horse: TODO bounded context.
//!
//! Tasks owned by a user. The `DEFAULT` read model folds the TODO stream
//! alone; `WITH_AUTHOR` also follows the USER stream so embedded author
//! names stay current.

pub mod application;
pub mod domain;
