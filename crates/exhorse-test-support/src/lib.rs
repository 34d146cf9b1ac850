//! Shared test doubles and utilities for the ex-horse aggregate store.

mod clock;
mod event_log;
mod snapshot_store;

pub use clock::{FixedClock, ManualClock, fixed_time};
pub use event_log::{FailingEventLog, InMemoryEventLog, event_at};
pub use snapshot_store::{FailingSnapshotStore, InMemorySnapshotStore};
