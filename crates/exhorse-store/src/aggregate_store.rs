//! The aggregate store: the write and read surface for one aggregate.
//!
//! Writes validate against the freshly rehydrated state, append one event and
//! read the entity back, so callers see their own writes.

use std::sync::Arc;

use exhorse_core::entity::Entity;
use exhorse_core::error::DomainError;
use exhorse_core::event::{DEFAULT_READ_MODEL, EventKind, StoredEvent};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::query::{Filter, FindQuery, PageResult};
use crate::rehydrate::{Rehydrated, Rehydrator};

/// A domain-specific event to append.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    /// Kind name; must not be a built-in kind.
    pub kind: EventKind,
    /// Entity concerned, if any.
    pub aggregate_id: Option<Uuid>,
    /// Kind-specific data.
    pub payload: Value,
    /// Restricts the event to one read model. `None` feeds all of them.
    pub read_model: Option<String>,
}

impl EventDraft {
    /// A draft feeding every read model of the aggregate.
    #[must_use]
    pub fn new(kind: impl Into<EventKind>, aggregate_id: Option<Uuid>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            aggregate_id,
            payload,
            read_model: None,
        }
    }

    /// Tags the draft for one read model.
    #[must_use]
    pub fn only_for(mut self, read_model: impl Into<String>) -> Self {
        self.read_model = Some(read_model.into());
        self
    }
}

/// CRUD and query operations over one `(aggregate, read_model)`.
#[derive(Debug, Clone)]
pub struct AggregateStore {
    aggregate_name: String,
    read_model: String,
    rehydrator: Arc<Rehydrator>,
}

impl AggregateStore {
    /// A store over the `DEFAULT` read model of `aggregate_name`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownProjection` if that projection is not
    /// registered.
    pub fn new(rehydrator: Arc<Rehydrator>, aggregate_name: impl Into<String>) -> Result<Self, DomainError> {
        Self::for_read_model(rehydrator, aggregate_name, DEFAULT_READ_MODEL)
    }

    /// A store over a named read model.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownProjection` if that projection is not
    /// registered.
    pub fn for_read_model(
        rehydrator: Arc<Rehydrator>,
        aggregate_name: impl Into<String>,
        read_model: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let aggregate_name = aggregate_name.into();
        let read_model = read_model.into();
        rehydrator.registry().get(&aggregate_name, &read_model)?;
        Ok(Self {
            aggregate_name,
            read_model,
            rehydrator,
        })
    }

    /// The same aggregate seen through another read model.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownProjection` if that projection is not
    /// registered.
    pub fn with_read_model(&self, read_model: impl Into<String>) -> Result<Self, DomainError> {
        Self::for_read_model(self.rehydrator.clone(), self.aggregate_name.clone(), read_model)
    }

    /// Aggregate this store writes.
    #[must_use]
    pub fn aggregate_name(&self) -> &str {
        &self.aggregate_name
    }

    /// Read model this store reads.
    #[must_use]
    pub fn read_model(&self) -> &str {
        &self.read_model
    }

    /// Mints an entity from `payload`.
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation` if `payload` is not an object.
    /// - `DomainError::Conflict` if a unique field is already taken.
    /// - `DomainError::Storage` if the log cannot be read or written.
    pub async fn create(&self, actor: Option<&str>, payload: Value) -> Result<Entity, DomainError> {
        let fields = require_object(payload)?;
        let current = self.rehydrate().await?;
        self.check_unique(&current, &fields)?;

        let id = Uuid::now_v7();
        self.append(actor, EventKind::Create, Some(id), None, Value::Object(fields))
            .await?;

        self.rehydrate()
            .await?
            .state
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                DomainError::Conflict(format!(
                    "{} entry was superseded by a concurrent create",
                    self.aggregate_name
                ))
            })
    }

    /// Replaces every domain field of an entity.
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation` if `payload` is not an object.
    /// - `DomainError::NotFound` if no live entity has `id`.
    /// - `DomainError::Storage` if the log cannot be read or written.
    pub async fn update(&self, actor: Option<&str>, id: Uuid, payload: Value) -> Result<Entity, DomainError> {
        self.modify(actor, EventKind::Update, id, payload).await
    }

    /// Deep-merges `payload` into an entity.
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation` if `payload` is not an object.
    /// - `DomainError::NotFound` if no live entity has `id`.
    /// - `DomainError::Storage` if the log cannot be read or written.
    pub async fn patch(&self, actor: Option<&str>, id: Uuid, payload: Value) -> Result<Entity, DomainError> {
        self.modify(actor, EventKind::Patch, id, payload).await
    }

    /// Removes an entity and returns it as it was. Removing an unknown ID is
    /// not an error and appends nothing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Storage` if the log cannot be read or written.
    pub async fn remove(&self, actor: Option<&str>, id: Uuid) -> Result<Option<Entity>, DomainError> {
        let Some(previous) = self.rehydrate().await?.state.get(&id).cloned() else {
            return Ok(None);
        };
        self.append(actor, EventKind::Remove, Some(id), None, Value::Object(Map::new()))
            .await?;
        Ok(Some(previous))
    }

    /// Appends a domain-specific event and returns its ID.
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation` if the draft names a built-in kind.
    /// - `DomainError::Storage` if the log cannot be written.
    pub async fn record(&self, actor: Option<&str>, draft: EventDraft) -> Result<Uuid, DomainError> {
        if draft.kind.is_builtin() {
            return Err(DomainError::Validation(format!(
                "{} events are written through the CRUD operations",
                draft.kind
            )));
        }
        self.append(actor, draft.kind, draft.aggregate_id, draft.read_model, draft.payload)
            .await
    }

    /// Rehydrates and runs `query`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidQuery` if the query fails
    /// [`FindQuery::validate`], or propagates rehydration failures; see
    /// [`Rehydrator::rehydrate`].
    pub async fn find(&self, query: &FindQuery) -> Result<PageResult, DomainError> {
        query.validate()?;
        Ok(query.apply(&self.rehydrate().await?.state))
    }

    /// Runs `query` against the last persisted snapshot without reading the
    /// log. The result may trail recent writes.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Storage` or `DomainError::CorruptSnapshot` if
    /// the snapshot cannot be read, or `DomainError::InvalidQuery` if the
    /// query fails [`FindQuery::validate`].
    pub async fn find_cached(&self, query: &FindQuery) -> Result<PageResult, DomainError> {
        query.validate()?;
        let cached = self
            .rehydrator
            .load_cached(&self.aggregate_name, &self.read_model)
            .await?;
        Ok(query.apply(&cached.state))
    }

    /// Returns one entity by ID.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if no live entity has `id`, or
    /// propagates rehydration failures.
    pub async fn get(&self, id: Uuid) -> Result<Entity, DomainError> {
        self.rehydrate()
            .await?
            .state
            .get(&id)
            .cloned()
            .ok_or_else(|| self.not_found(Some(id)))
    }

    /// Returns the first entity, in creation order, matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if nothing matches, or propagates
    /// rehydration failures.
    pub async fn get_one(&self, filter: &Filter) -> Result<Entity, DomainError> {
        self.rehydrate()
            .await?
            .state
            .iter()
            .find(|entity| filter.matches(&entity.to_document()))
            .cloned()
            .ok_or_else(|| self.not_found(None))
    }

    /// Every event ever recorded for `id`, ascending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Storage` if the log cannot be read.
    pub async fn history(&self, id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        self.rehydrator
            .events()
            .history(&self.aggregate_name, id)
            .await
    }

    /// Replays this read model from the beginning and refreshes its snapshot.
    ///
    /// # Errors
    ///
    /// Propagates rehydration failures; see [`Rehydrator::rebuild`].
    pub async fn rebuild(&self) -> Result<Rehydrated, DomainError> {
        self.rehydrator
            .rebuild(&self.aggregate_name, &self.read_model)
            .await
    }

    async fn rehydrate(&self) -> Result<Rehydrated, DomainError> {
        self.rehydrator
            .rehydrate(&self.aggregate_name, &self.read_model)
            .await
    }

    async fn modify(
        &self,
        actor: Option<&str>,
        kind: EventKind,
        id: Uuid,
        payload: Value,
    ) -> Result<Entity, DomainError> {
        let fields = require_object(payload)?;
        if self.rehydrate().await?.state.get(&id).is_none() {
            return Err(self.not_found(Some(id)));
        }
        self.append(actor, kind, Some(id), None, Value::Object(fields))
            .await?;
        self.get(id).await
    }

    fn check_unique(&self, current: &Rehydrated, fields: &Map<String, Value>) -> Result<(), DomainError> {
        let definition = self
            .rehydrator
            .registry()
            .get(&self.aggregate_name, &self.read_model)?;
        match definition.reducer().unique_collision(&current.state, fields) {
            Some(field) => Err(DomainError::Conflict(format!(
                "{field} {} already exists in {}",
                fields.get(field).map(Value::to_string).unwrap_or_default(),
                self.aggregate_name
            ))),
            None => Ok(()),
        }
    }

    async fn append(
        &self,
        actor: Option<&str>,
        kind: EventKind,
        aggregate_id: Option<Uuid>,
        read_model: Option<String>,
        payload: Value,
    ) -> Result<Uuid, DomainError> {
        let event = StoredEvent {
            event_id: Uuid::now_v7(),
            aggregate_name: self.aggregate_name.clone(),
            aggregate_id,
            read_model,
            kind,
            payload,
            actor: actor.map(str::to_owned),
            occurred_at: self.rehydrator.clock().event_time(),
        };
        debug!(
            aggregate = %self.aggregate_name,
            kind = %event.kind,
            event_id = %event.event_id,
            "appending event"
        );
        self.rehydrator.events().append(event).await
    }

    fn not_found(&self, id: Option<Uuid>) -> DomainError {
        DomainError::NotFound {
            aggregate: self.aggregate_name.clone(),
            id,
        }
    }
}

fn require_object(payload: Value) -> Result<Map<String, Value>, DomainError> {
    match payload {
        Value::Object(fields) => Ok(fields),
        other => Err(DomainError::Validation(format!(
            "payload must be an object, got {other}"
        ))),
    }
}
