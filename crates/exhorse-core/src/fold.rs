//! The event folder: a total, deterministic `(state, event) -> state'`.
//!
//! Built-in kinds are folded here. Domain-specific kinds are dispatched to
//! handlers registered on a [`Reducer`]; kinds nobody handles pass through
//! with a warning.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::entity::{Entity, ProjectionState, RESERVED_FIELDS, without_reserved};
use crate::error::DomainError;
use crate::event::{EventKind, StoredEvent};

/// Folds one domain-specific event into a projection state.
pub type EventHandler = fn(&mut ProjectionState, &StoredEvent);

/// Dispatch table for one projection.
#[derive(Debug, Clone, Default)]
pub struct Reducer {
    projection: String,
    handlers: HashMap<String, EventHandler>,
    unique_fields: Vec<String>,
}

impl Reducer {
    /// Creates a reducer that folds only the built-in kinds.
    #[must_use]
    pub fn new(projection: impl Into<String>) -> Self {
        Self {
            projection: projection.into(),
            ..Self::default()
        }
    }

    /// Declares a field whose non-null values must be unique across
    /// entities. A colliding `CREATE` folds to a no-op.
    #[must_use]
    pub fn with_unique_field(mut self, field: impl Into<String>) -> Self {
        self.unique_fields.push(field.into());
        self
    }

    /// Registers a handler for a domain-specific kind.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateHandler` if `kind` is built-in or
    /// already has a handler.
    pub fn register(
        &mut self,
        kind: impl Into<EventKind>,
        handler: EventHandler,
    ) -> Result<(), DomainError> {
        let kind = kind.into();
        if kind.is_builtin() || self.handlers.contains_key(kind.as_str()) {
            return Err(DomainError::DuplicateHandler {
                projection: self.projection.clone(),
                kind: kind.to_string(),
            });
        }
        self.handlers.insert(kind.to_string(), handler);
        Ok(())
    }

    /// Returns the fields declared unique.
    #[must_use]
    pub fn unique_fields(&self) -> &[String] {
        &self.unique_fields
    }

    /// Returns the first unique field on which `payload` collides with a
    /// live entity.
    #[must_use]
    pub fn unique_collision<'a>(
        &'a self,
        state: &ProjectionState,
        payload: &Map<String, Value>,
    ) -> Option<&'a str> {
        self.unique_fields.iter().map(String::as_str).find(|field| {
            payload
                .get(*field)
                .filter(|value| !value.is_null())
                .is_some_and(|value| state.iter().any(|e| e.field(field) == Some(value)))
        })
    }

    /// Applies one event.
    pub fn fold(&self, state: &mut ProjectionState, event: &StoredEvent) {
        match &event.kind {
            EventKind::Create => self.apply_create(state, event),
            EventKind::Update => apply_update(state, event),
            EventKind::Patch => apply_patch(state, event),
            EventKind::Remove => apply_remove(state, event),
            EventKind::Custom(name) => match self.handlers.get(name) {
                Some(handler) => handler(state, event),
                None => warn!(
                    projection = %self.projection,
                    kind = %name,
                    event_id = %event.event_id,
                    "unhandled event"
                ),
            },
        }
    }

    /// Applies events in order and returns how many were folded.
    pub fn fold_all<'e>(
        &self,
        state: &mut ProjectionState,
        events: impl IntoIterator<Item = &'e StoredEvent>,
    ) -> usize {
        events.into_iter().fold(0, |count, event| {
            self.fold(state, event);
            count + 1
        })
    }

    fn apply_create(&self, state: &mut ProjectionState, event: &StoredEvent) {
        let Some(id) = event.aggregate_id else {
            warn!(projection = %self.projection, event_id = %event.event_id, "create without aggregate id");
            return;
        };
        if state.get(&id).is_some() {
            return;
        }
        let fields = payload_fields(&event.payload);
        if self.unique_collision(state, &fields).is_some() {
            return;
        }
        state.insert(Entity::new(id, event.occurred_at, fields));
    }
}

/// Replaces every domain field of the target entity. Unknown IDs are a no-op.
pub fn apply_update(state: &mut ProjectionState, event: &StoredEvent) {
    let Some(entity) = event.aggregate_id.and_then(|id| state.get_mut(&id)) else {
        return;
    };
    entity.fields = without_reserved(payload_fields(&event.payload));
    entity.updated_at = event.occurred_at;
}

/// Deep-merges the payload into the target entity. Unknown IDs are a no-op.
pub fn apply_patch(state: &mut ProjectionState, event: &StoredEvent) {
    let Some(entity) = event.aggregate_id.and_then(|id| state.get_mut(&id)) else {
        return;
    };
    for (key, value) in payload_fields(&event.payload) {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        merge_field(&mut entity.fields, key, value);
    }
    entity.updated_at = event.occurred_at;
}

/// Deletes the target entity. Unknown IDs are a no-op.
pub fn apply_remove(state: &mut ProjectionState, event: &StoredEvent) {
    if let Some(id) = event.aggregate_id {
        state.remove(&id);
    }
}

/// Merges `patch` into `target`.
///
/// Arrays concatenate, `null` never overwrites, objects merge recursively,
/// and any other value replaces the target.
pub fn merge_patch(target: &mut Value, patch: Value) {
    match (target, patch) {
        (_, Value::Null) => {}
        (Value::Array(existing), Value::Array(items)) => existing.extend(items),
        (Value::Array(existing), item) => existing.push(item),
        (Value::Object(existing), Value::Object(fields)) => {
            for (key, value) in fields {
                merge_field(existing, key, value);
            }
        }
        (slot, value) => *slot = value,
    }
}

fn merge_field(target: &mut Map<String, Value>, key: String, value: Value) {
    match target.get_mut(&key) {
        Some(existing) => merge_patch(existing, value),
        None => {
            target.insert(key, value);
        }
    }
}

fn payload_fields(payload: &Value) -> Map<String, Value> {
    payload.as_object().cloned().unwrap_or_default()
}
