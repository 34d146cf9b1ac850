//! ex-horse Event Store: PostgreSQL persistence for the event log and the
//! snapshot cache.

pub mod pg_event_log;
pub mod pg_snapshot_store;
pub mod schema;

pub use pg_event_log::PgEventLog;
pub use pg_snapshot_store::PgSnapshotStore;
