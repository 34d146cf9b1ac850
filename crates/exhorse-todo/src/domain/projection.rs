//! The TODO read models.

use exhorse_core::entity::ProjectionState;
use exhorse_core::error::DomainError;
use exhorse_core::event::{DEFAULT_READ_MODEL, EventKind, StoredEvent};
use exhorse_store::{ProjectionDefinition, ProjectionRegistry};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::domain::events::{
    AUTHOR_AGGREGATE, COMPLETE_EVENT_TYPE, TODO_AGGREGATE, WITH_AUTHOR_READ_MODEL,
};

/// The `TODO/DEFAULT` projection.
///
/// # Errors
///
/// Returns `DomainError::DuplicateHandler` if handler registration fails.
pub fn todo_projection() -> Result<ProjectionDefinition, DomainError> {
    ProjectionDefinition::new(TODO_AGGREGATE, DEFAULT_READ_MODEL)
        .on(COMPLETE_EVENT_TYPE, apply_complete)
}

/// The `TODO/WITH_AUTHOR` projection, cascading from `USER/DEFAULT`.
///
/// # Errors
///
/// Returns `DomainError::DuplicateHandler` if handler registration fails.
pub fn with_author_projection() -> Result<ProjectionDefinition, DomainError> {
    Ok(
        ProjectionDefinition::new(TODO_AGGREGATE, WITH_AUTHOR_READ_MODEL)
            .on(COMPLETE_EVENT_TYPE, apply_complete)?
            .depends_on(AUTHOR_AGGREGATE, DEFAULT_READ_MODEL, apply_author_event),
    )
}

/// Adds every TODO projection to `registry`.
///
/// # Errors
///
/// Returns `DomainError` if a projection is already registered.
pub fn register(registry: &mut ProjectionRegistry) -> Result<(), DomainError> {
    registry.register(todo_projection()?)?;
    registry.register(with_author_projection()?)
}

/// Marks the target todo done.
pub fn apply_complete(state: &mut ProjectionState, event: &StoredEvent) {
    let Some(todo) = event.aggregate_id.and_then(|id| state.get_mut(&id)) else {
        return;
    };
    todo.fields.insert("done".into(), Value::Bool(true));
    todo.fields
        .insert("completedAt".into(), json!(event.occurred_at.to_rfc3339()));
    todo.updated_at = event.occurred_at;
}

fn authored_by(author: Uuid) -> impl Fn(&Value) -> bool {
    move |value| {
        value
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
            == Some(author)
    }
}

/// Folds a USER event into the todos it authored: renames refresh
/// `author.username`, removals clear `author`.
pub fn apply_author_event(state: &mut ProjectionState, event: &StoredEvent) {
    let Some(author) = event.aggregate_id else {
        return;
    };
    let is_author = authored_by(author);
    match event.kind {
        EventKind::Update | EventKind::Patch => {
            let Some(username) = event.payload.get("username").filter(|v| !v.is_null()) else {
                return;
            };
            for todo in state.iter_mut() {
                if let Some(embedded) = todo.fields.get_mut("author") {
                    if is_author(embedded) {
                        embedded["username"] = username.clone();
                    }
                }
            }
        }
        EventKind::Remove => {
            for todo in state.iter_mut() {
                if todo.field("author").is_some_and(&is_author) {
                    todo.fields.insert("author".into(), Value::Null);
                }
            }
        }
        _ => {}
    }
}
