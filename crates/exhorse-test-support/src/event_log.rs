//! Test event logs: `EventLog` implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exhorse_core::error::DomainError;
use exhorse_core::event::{EventKind, StoredEvent};
use exhorse_core::repository::{EventFilter, EventLog};
use uuid::Uuid;

/// Builds an event with a fresh v7 ID and no actor or read-model tag.
#[must_use]
pub fn event_at(
    aggregate_name: &str,
    kind: impl Into<EventKind>,
    aggregate_id: Option<Uuid>,
    payload: serde_json::Value,
    occurred_at: DateTime<Utc>,
) -> StoredEvent {
    StoredEvent {
        event_id: Uuid::now_v7(),
        aggregate_name: aggregate_name.to_owned(),
        aggregate_id,
        read_model: None,
        kind: kind.into(),
        payload,
        actor: None,
        occurred_at,
    }
}

/// An event log held in memory, kept sorted by watermark.
///
/// It can be switched unavailable to simulate a storage outage, and counts
/// `fetch` calls so tests can assert when the log was consulted.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    events: Mutex<Vec<StoredEvent>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
}

impl InMemoryEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log pre-seeded with `events`.
    #[must_use]
    pub fn with_events(events: Vec<StoredEvent>) -> Self {
        let log = Self::new();
        for event in events {
            log.insert(event);
        }
        log
    }

    /// Makes every subsequent call fail with `DomainError::Storage` until
    /// switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns a copy of every event, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self) -> Vec<StoredEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn insert(&self, event: StoredEvent) {
        let mut events = self.events.lock().unwrap();
        let position = events.partition_point(|e| e.watermark() <= event.watermark());
        events.insert(position, event);
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::Storage("event log unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: StoredEvent) -> Result<Uuid, DomainError> {
        self.check_available()?;
        let id = event.event_id;
        self.insert(event);
        Ok(id)
    }

    async fn fetch(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, DomainError> {
        self.check_available()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect())
    }
}

/// An event log that always returns a storage error. Useful for testing
/// error-handling paths.
#[derive(Debug)]
pub struct FailingEventLog;

#[async_trait]
impl EventLog for FailingEventLog {
    async fn append(&self, _event: StoredEvent) -> Result<Uuid, DomainError> {
        Err(DomainError::Storage("connection refused".into()))
    }

    async fn fetch(&self, _filter: &EventFilter) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Storage("connection refused".into()))
    }
}
