//! Domain events and constants for the TODO context.

/// Aggregate name of the TODO stream.
pub const TODO_AGGREGATE: &str = "TODO";

/// Aggregate whose entities author todos.
pub const AUTHOR_AGGREGATE: &str = "USER";

/// Event type recorded when a todo is marked done.
pub const COMPLETE_EVENT_TYPE: &str = "COMPLETE";

/// Read model that keeps `author` in sync with the USER stream.
pub const WITH_AUTHOR_READ_MODEL: &str = "WITH_AUTHOR";
