//! Storage abstractions: the append-only event log and the snapshot cache.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::ProjectionState;
use crate::error::DomainError;
use crate::event::{EventKind, StoredEvent, Watermark};

/// Selects a range of one aggregate's events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Stream to read.
    pub aggregate_name: String,
    /// Keep untagged events and those tagged with this read model.
    pub read_model: Option<String>,
    /// Exclusive lower bound.
    pub after: Option<Watermark>,
    /// Inclusive upper bound.
    pub until: Option<Watermark>,
    /// Keep only events for these IDs (plus creations, see below).
    pub aggregate_ids: Option<Vec<Uuid>>,
    /// With `aggregate_ids`, also keep every `CREATE`, so a caller that knows
    /// only part of the live IDs still sees new entities.
    pub include_creations: bool,
}

impl EventFilter {
    /// Every event of an aggregate.
    #[must_use]
    pub fn stream(aggregate_name: impl Into<String>) -> Self {
        Self {
            aggregate_name: aggregate_name.into(),
            read_model: None,
            after: None,
            until: None,
            aggregate_ids: None,
            include_creations: false,
        }
    }

    /// Restricts to events feeding `read_model`.
    #[must_use]
    pub fn for_read_model(mut self, read_model: impl Into<String>) -> Self {
        self.read_model = Some(read_model.into());
        self
    }

    /// Keeps events strictly after `watermark`.
    #[must_use]
    pub fn after(mut self, watermark: Option<Watermark>) -> Self {
        self.after = watermark;
        self
    }

    /// Keeps events up to and including `watermark`.
    #[must_use]
    pub fn until(mut self, watermark: Option<Watermark>) -> Self {
        self.until = watermark;
        self
    }

    /// Keeps events for `ids`, and every creation if `include_creations`.
    #[must_use]
    pub fn for_ids(mut self, ids: Vec<Uuid>, include_creations: bool) -> Self {
        self.aggregate_ids = Some(ids);
        self.include_creations = include_creations;
        self
    }

    /// Returns `true` if `event` falls inside this filter. Backends that
    /// cannot push the filter down apply it with this.
    #[must_use]
    pub fn matches(&self, event: &StoredEvent) -> bool {
        let position = event.watermark();
        event.aggregate_name == self.aggregate_name
            && self.read_model.as_deref().is_none_or(|rm| event.feeds(rm))
            && self.after.is_none_or(|after| position > after)
            && self.until.is_none_or(|until| position <= until)
            && self.aggregate_ids.as_ref().is_none_or(|ids| {
                event.aggregate_id.is_some_and(|id| ids.contains(&id))
                    || (self.include_creations && event.kind == EventKind::Create)
            })
    }
}

/// Append-only event log, the single source of truth.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Durably appends one event and returns its ID. Performs no business
    /// validation.
    async fn append(&self, event: StoredEvent) -> Result<Uuid, DomainError>;

    /// Returns the events selected by `filter`, ascending by watermark.
    async fn fetch(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, DomainError>;

    /// Returns every event of one entity, ascending.
    async fn history(
        &self,
        aggregate_name: &str,
        aggregate_id: Uuid,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        self.fetch(&EventFilter::stream(aggregate_name).for_ids(vec![aggregate_id], false))
            .await
    }
}

/// Cached materialization of one projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Aggregate the projection reads.
    pub aggregate_name: String,
    /// Read model discriminator.
    pub read_model: String,
    /// Entities as of `watermark`.
    pub state: ProjectionState,
    /// Last local event folded in. `None` before any event.
    pub watermark: Option<Watermark>,
    /// Last foreign event consumed per dependency, keyed by `aggregate/read_model`.
    pub dependencies: BTreeMap<String, Watermark>,
    /// When this snapshot was produced.
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// An empty snapshot positioned at the beginning of time.
    #[must_use]
    pub fn empty(
        aggregate_name: impl Into<String>,
        read_model: impl Into<String>,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            aggregate_name: aggregate_name.into(),
            read_model: read_model.into(),
            state: ProjectionState::new(),
            watermark: None,
            dependencies: BTreeMap::new(),
            taken_at,
        }
    }

    /// Returns `true` if this snapshot has folded strictly more than
    /// `stored`: its local watermark is ahead, or equal with no dependency
    /// behind and at least one ahead.
    #[must_use]
    pub fn is_ahead_of(&self, stored: &Snapshot) -> bool {
        if self.watermark != stored.watermark {
            return self.watermark > stored.watermark;
        }
        let mut advanced = false;
        for (key, stored_mark) in &stored.dependencies {
            match self.dependencies.get(key) {
                Some(mark) if mark < stored_mark => return false,
                Some(mark) if mark > stored_mark => advanced = true,
                Some(_) => {}
                None => return false,
            }
        }
        advanced
            || self
                .dependencies
                .keys()
                .any(|key| !stored.dependencies.contains_key(key))
    }
}

/// Result of a snapshot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The snapshot replaced the stored one.
    Stored,
    /// The stored snapshot was equal or ahead; nothing was written.
    Stale,
}

/// Snapshot cache, one record per `(aggregate, read_model)` replaced in place.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads the current snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::CorruptSnapshot` if the record cannot be decoded.
    async fn load(
        &self,
        aggregate_name: &str,
        read_model: &str,
    ) -> Result<Option<Snapshot>, DomainError>;

    /// Stores `snapshot` unless the stored one is equal or ahead.
    async fn save(&self, snapshot: &Snapshot) -> Result<SaveOutcome, DomainError>;

    /// Discards the snapshot so the next read replays from the beginning.
    async fn delete(&self, aggregate_name: &str, read_model: &str) -> Result<(), DomainError>;
}
