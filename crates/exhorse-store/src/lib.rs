//! ex-horse Store: the aggregate-store engine.
//!
//! Rebuilds read models on demand by folding the events past the last
//! snapshot, resolves read models that depend on other aggregates, and
//! serves filtered, sorted and paginated reads over the result.

pub mod aggregate_store;
pub mod config;
pub mod query;
pub mod registry;
pub mod rehydrate;

pub use aggregate_store::{AggregateStore, EventDraft};
pub use config::{ConfigError, SnapshotPolicy, StoreConfig};
pub use query::{Direction, Filter, FindQuery, Page, PageResult, SortKey};
pub use registry::{Dependency, ProjectionDefinition, ProjectionRegistry};
pub use rehydrate::{Rehydrated, Rehydrator};
