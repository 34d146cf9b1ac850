//! Query handlers for the TODO context.

use chrono::{DateTime, Utc};
use exhorse_core::entity::Entity;
use exhorse_core::error::DomainError;
use exhorse_store::{AggregateStore, FindQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Author embedded in a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorView {
    /// The user identifier.
    pub id: Uuid,
    /// Username at the time of the last fold.
    pub username: String,
}

/// Read-only view of a todo.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoView {
    /// The todo identifier.
    pub todo_id: Uuid,
    /// Short description.
    pub title: String,
    /// Tags in insertion order.
    pub tags: Vec<String>,
    /// Whether the todo was completed.
    pub done: bool,
    /// Completion time, RFC 3339.
    pub completed_at: Option<String>,
    /// The author, cleared once the user is deleted.
    pub author: Option<AuthorView>,
    /// When the todo was created.
    pub created_at: DateTime<Utc>,
    /// When the todo last changed.
    pub updated_at: DateTime<Utc>,
}

impl TodoView {
    /// Builds the view from a projected todo entity.
    #[must_use]
    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            todo_id: entity.id,
            title: entity
                .field("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            tags: entity
                .field("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            done: entity
                .field("done")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            completed_at: entity
                .field("completedAt")
                .and_then(Value::as_str)
                .map(str::to_owned),
            author: entity
                .field("author")
                .and_then(|author| serde_json::from_value(author.clone()).ok()),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// One page of todos.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPage {
    /// Todos matching the filter, ignoring the window.
    pub total: usize,
    /// Limit that was applied.
    pub limit: Option<usize>,
    /// Entities skipped, in offset mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    /// ID to continue after.
    pub cursor: Option<Uuid>,
    /// Todos on this page.
    pub data: Vec<TodoView>,
}

/// Retrieves a todo by ID.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if no such todo exists.
pub async fn get_todo(todo_id: Uuid, todos: &AggregateStore) -> Result<TodoView, DomainError> {
    todos.get(todo_id).await.map(|entity| TodoView::from_entity(&entity))
}

/// Lists todos from whichever read model `todos` is bound to.
///
/// When the log is unavailable the last snapshot is served instead, which
/// may trail recent writes.
///
/// # Errors
///
/// Returns `DomainError` if rehydration fails for any other reason, or if
/// the snapshot cannot be read either.
pub async fn list_todos(query: &FindQuery, todos: &AggregateStore) -> Result<TodoPage, DomainError> {
    let page = match todos.find(query).await {
        Ok(page) => page,
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "event log unavailable, serving cached todos");
            todos.find_cached(query).await?
        }
        Err(e) => return Err(e),
    };
    Ok(TodoPage {
        total: page.total,
        limit: page.limit,
        skip: page.skip,
        cursor: page.cursor,
        data: page.data.iter().map(TodoView::from_entity).collect(),
    })
}

#[cfg(test)]
mod tests {
    use exhorse_test_support::fixed_time;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_view_reads_missing_fields_as_defaults() {
        let fields = json!({"title": "a", "author": null}).as_object().cloned().unwrap();
        let entity = Entity::new(Uuid::now_v7(), fixed_time(), fields);

        let view = TodoView::from_entity(&entity);

        assert_eq!(view.title, "a");
        assert!(view.tags.is_empty());
        assert!(!view.done);
        assert!(view.author.is_none());
    }
}
