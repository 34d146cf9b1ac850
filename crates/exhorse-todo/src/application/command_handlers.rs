//! Command handlers for the TODO context.

use exhorse_core::command::Command;
use exhorse_core::error::DomainError;
use exhorse_store::{AggregateStore, EventDraft};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::application::query_handlers::{TodoView, get_todo};
use crate::domain::commands::{CompleteTodo, CreateTodo, DeleteTodo, PatchTodo, ReplaceTodo};
use crate::domain::events::COMPLETE_EVENT_TYPE;

fn require_title(title: &str) -> Result<(), DomainError> {
    if title.trim().is_empty() {
        return Err(DomainError::Validation("title must not be empty".into()));
    }
    Ok(())
}

/// Handles the `CreateTodo` command. The author is looked up through the
/// USER store and embedded as `{id, username}`.
///
/// # Errors
///
/// - `DomainError::Validation` if the title is empty.
/// - `DomainError::NotFound` if the author does not exist.
pub async fn handle_create_todo(
    command: &CreateTodo,
    users: &AggregateStore,
    todos: &AggregateStore,
) -> Result<TodoView, DomainError> {
    require_title(&command.title)?;
    let author = users.get(command.author_id).await?;
    let username = author.field("username").cloned().unwrap_or(Value::Null);

    let created = todos
        .create(
            command.actor(),
            json!({
                "title": command.title,
                "tags": command.tags,
                "done": false,
                "author": {"id": author.id, "username": username},
            }),
        )
        .await?;

    info!(
        command = command.command_type(),
        todo_id = %created.id,
        author_id = %author.id,
        "todo created"
    );
    Ok(TodoView::from_entity(&created))
}

/// Handles the `PatchTodo` command.
///
/// # Errors
///
/// - `DomainError::Validation` if the new title is empty or nothing would change.
/// - `DomainError::NotFound` if the todo does not exist.
pub async fn handle_patch_todo(
    command: &PatchTodo,
    todos: &AggregateStore,
) -> Result<TodoView, DomainError> {
    let mut payload = Map::new();
    if let Some(title) = &command.title {
        require_title(title)?;
        payload.insert("title".into(), json!(title));
    }
    if let Some(tags) = &command.tags {
        payload.insert("tags".into(), json!(tags));
    }
    if payload.is_empty() {
        return Err(DomainError::Validation("nothing to change".into()));
    }

    let patched = todos
        .patch(command.actor(), command.todo_id, Value::Object(payload))
        .await?;
    Ok(TodoView::from_entity(&patched))
}

/// Fields a replace carries over from the current todo.
const CARRIED_FIELDS: [&str; 3] = ["author", "done", "completedAt"];

/// Handles the `ReplaceTodo` command with a full replace.
///
/// # Errors
///
/// - `DomainError::Validation` if the title is empty.
/// - `DomainError::NotFound` if the todo does not exist.
pub async fn handle_replace_todo(
    command: &ReplaceTodo,
    todos: &AggregateStore,
) -> Result<TodoView, DomainError> {
    require_title(&command.title)?;
    let current = todos.get(command.todo_id).await?;

    let mut payload = Map::new();
    payload.insert("title".into(), json!(command.title));
    payload.insert("tags".into(), json!(command.tags));
    for name in CARRIED_FIELDS {
        if let Some(value) = current.field(name) {
            payload.insert(name.to_owned(), value.clone());
        }
    }

    let replaced = todos
        .update(command.actor(), command.todo_id, Value::Object(payload))
        .await?;
    info!(command = command.command_type(), todo_id = %replaced.id, "todo replaced");
    Ok(TodoView::from_entity(&replaced))
}

/// Handles the `CompleteTodo` command by recording a `COMPLETE` event.
///
/// # Errors
///
/// - `DomainError::NotFound` if the todo does not exist.
/// - `DomainError::Conflict` if it is already done.
pub async fn handle_complete_todo(
    command: &CompleteTodo,
    todos: &AggregateStore,
) -> Result<TodoView, DomainError> {
    let current = get_todo(command.todo_id, todos).await?;
    if current.done {
        return Err(DomainError::Conflict(format!(
            "Todo {} is already done.",
            command.todo_id
        )));
    }

    todos
        .record(
            command.actor(),
            EventDraft::new(COMPLETE_EVENT_TYPE, Some(command.todo_id), json!({})),
        )
        .await?;
    info!(command = command.command_type(), todo_id = %command.todo_id, "todo completed");
    get_todo(command.todo_id, todos).await
}

/// Handles the `DeleteTodo` command. Deleting an unknown todo is a no-op
/// returning `None`.
///
/// # Errors
///
/// Returns `DomainError::Storage` if the log cannot be read or written.
pub async fn handle_delete_todo(
    command: &DeleteTodo,
    todos: &AggregateStore,
) -> Result<Option<TodoView>, DomainError> {
    let removed = todos.remove(command.actor(), command.todo_id).await?;
    Ok(removed.as_ref().map(TodoView::from_entity))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use exhorse_core::event::{DEFAULT_READ_MODEL, EventKind};
    use exhorse_store::{FindQuery, ProjectionDefinition, ProjectionRegistry, Rehydrator, SnapshotPolicy};
    use exhorse_test_support::{InMemoryEventLog, InMemorySnapshotStore, ManualClock};
    use uuid::Uuid;

    use super::*;
    use crate::application::query_handlers::list_todos;
    use crate::domain::events::{AUTHOR_AGGREGATE, TODO_AGGREGATE, WITH_AUTHOR_READ_MODEL};
    use crate::domain::projection;

    struct Stores {
        users: AggregateStore,
        todos: AggregateStore,
        log: Arc<InMemoryEventLog>,
        snapshots: Arc<InMemorySnapshotStore>,
    }

    fn stores() -> Stores {
        let mut registry = ProjectionRegistry::new();
        registry
            .register(
                ProjectionDefinition::new(AUTHOR_AGGREGATE, DEFAULT_READ_MODEL)
                    .with_unique_field("username"),
            )
            .unwrap();
        projection::register(&mut registry).unwrap();
        let log = Arc::new(InMemoryEventLog::new());
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let rehydrator = Arc::new(Rehydrator::new(
            log.clone(),
            snapshots.clone(),
            Arc::new(registry),
            Arc::new(ManualClock::default()),
            SnapshotPolicy::EveryEvents(1),
        ));
        Stores {
            users: AggregateStore::new(rehydrator.clone(), AUTHOR_AGGREGATE).unwrap(),
            todos: AggregateStore::new(rehydrator, TODO_AGGREGATE).unwrap(),
            log,
            snapshots,
        }
    }

    fn create(author_id: Uuid, title: &str) -> CreateTodo {
        CreateTodo {
            actor: Some("bob".into()),
            author_id,
            title: title.into(),
            tags: vec!["home".into()],
        }
    }

    #[tokio::test]
    async fn test_handle_create_todo_embeds_author() {
        // Arrange
        let s = stores();
        let bob = s.users.create(None, json!({"username": "bob"})).await.unwrap();

        // Act
        let todo = handle_create_todo(&create(bob.id, "buy milk"), &s.users, &s.todos)
            .await
            .unwrap();

        // Assert
        assert_eq!(todo.title, "buy milk");
        assert_eq!(todo.tags, vec!["home".to_owned()]);
        assert!(!todo.done);
        let author = todo.author.unwrap();
        assert_eq!(author.id, bob.id);
        assert_eq!(author.username, "bob");
    }

    #[tokio::test]
    async fn test_handle_create_todo_unknown_author_appends_nothing() {
        let s = stores();

        let result = handle_create_todo(&create(Uuid::now_v7(), "x"), &s.users, &s.todos).await;

        match result {
            Err(DomainError::NotFound { aggregate, .. }) => assert_eq!(aggregate, "USER"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(s.log.events().is_empty());
    }

    #[tokio::test]
    async fn test_handle_patch_todo_appends_tags_and_keeps_title() {
        let s = stores();
        let bob = s.users.create(None, json!({"username": "bob"})).await.unwrap();
        let todo = handle_create_todo(&create(bob.id, "buy milk"), &s.users, &s.todos)
            .await
            .unwrap();

        let patched = handle_patch_todo(
            &PatchTodo {
                actor: None,
                todo_id: todo.todo_id,
                title: None,
                tags: Some(vec!["errand".into()]),
            },
            &s.todos,
        )
        .await
        .unwrap();

        assert_eq!(patched.title, "buy milk");
        assert_eq!(patched.tags, vec!["home".to_owned(), "errand".to_owned()]);
    }

    #[tokio::test]
    async fn test_handle_patch_todo_rejects_empty_patch() {
        let s = stores();

        let result = handle_patch_todo(
            &PatchTodo {
                actor: None,
                todo_id: Uuid::now_v7(),
                title: None,
                tags: None,
            },
            &s.todos,
        )
        .await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_handle_complete_todo_once() {
        // Arrange
        let s = stores();
        let bob = s.users.create(None, json!({"username": "bob"})).await.unwrap();
        let todo = handle_create_todo(&create(bob.id, "buy milk"), &s.users, &s.todos)
            .await
            .unwrap();
        let command = CompleteTodo {
            actor: Some("bob".into()),
            todo_id: todo.todo_id,
        };

        // Act
        let done = handle_complete_todo(&command, &s.todos).await.unwrap();
        let again = handle_complete_todo(&command, &s.todos).await;

        // Assert
        assert!(done.done);
        assert!(done.completed_at.is_some());
        assert!(matches!(again, Err(DomainError::Conflict(_))));
        let complete = s.log.events().pop().unwrap();
        assert_eq!(complete.kind.as_str(), COMPLETE_EVENT_TYPE);
        assert_eq!(complete.actor.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_handle_delete_todo() {
        let s = stores();
        let bob = s.users.create(None, json!({"username": "bob"})).await.unwrap();
        let todo = handle_create_todo(&create(bob.id, "buy milk"), &s.users, &s.todos)
            .await
            .unwrap();
        let command = DeleteTodo {
            actor: None,
            todo_id: todo.todo_id,
        };

        let removed = handle_delete_todo(&command, &s.todos).await.unwrap();
        let again = handle_delete_todo(&command, &s.todos).await.unwrap();

        assert_eq!(removed.map(|t| t.title), Some("buy milk".to_owned()));
        assert!(again.is_none());
        assert!(matches!(
            get_todo(todo.todo_id, &s.todos).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_with_author_follows_user_renames_and_removals() {
        // Arrange
        let s = stores();
        let with_author = s.todos.with_read_model(WITH_AUTHOR_READ_MODEL).unwrap();
        let bob = s.users.create(None, json!({"username": "bob"})).await.unwrap();
        let todo = handle_create_todo(&create(bob.id, "buy milk"), &s.users, &s.todos)
            .await
            .unwrap();
        list_todos(&FindQuery::default(), &with_author).await.unwrap();

        // Act
        s.users
            .patch(None, bob.id, json!({"username": "robert"}))
            .await
            .unwrap();
        let renamed = get_todo(todo.todo_id, &with_author).await.unwrap();
        let plain = get_todo(todo.todo_id, &s.todos).await.unwrap();
        s.users.remove(None, bob.id).await.unwrap();
        let orphaned = get_todo(todo.todo_id, &with_author).await.unwrap();

        // Assert
        assert_eq!(renamed.author.unwrap().username, "robert");
        assert_eq!(plain.author.unwrap().username, "bob");
        assert!(orphaned.author.is_none());
        let snapshot = s
            .snapshots
            .stored(TODO_AGGREGATE, WITH_AUTHOR_READ_MODEL)
            .unwrap();
        assert!(snapshot.dependencies.contains_key("USER/DEFAULT"));
    }

    #[tokio::test]
    async fn test_handle_replace_todo_drops_unlisted_tags_and_keeps_author() {
        // Arrange
        let s = stores();
        let bob = s.users.create(None, json!({"username": "bob"})).await.unwrap();
        let todo = handle_create_todo(&create(bob.id, "walk"), &s.users, &s.todos)
            .await
            .unwrap();
        let complete = CompleteTodo {
            actor: None,
            todo_id: todo.todo_id,
        };
        let completed = handle_complete_todo(&complete, &s.todos).await.unwrap();

        // Act
        let replace = ReplaceTodo {
            actor: None,
            todo_id: todo.todo_id,
            title: "run".into(),
            tags: Vec::new(),
        };
        let replaced = handle_replace_todo(&replace, &s.todos).await.unwrap();

        // Assert
        assert_eq!(replaced.title, "run");
        assert!(replaced.tags.is_empty());
        assert!(replaced.done);
        assert_eq!(replaced.completed_at, completed.completed_at);
        assert_eq!(replaced.author.map(|a| a.id), Some(bob.id));
        assert_eq!(replaced.created_at, todo.created_at);
        assert_eq!(s.log.events().pop().map(|e| e.kind), Some(EventKind::Update));
    }

    #[tokio::test]
    async fn test_handle_replace_todo_rejects_blank_title_and_unknown_id() {
        let s = stores();
        let replace = |todo_id: Uuid, title: &str| ReplaceTodo {
            actor: None,
            todo_id,
            title: title.into(),
            tags: Vec::new(),
        };

        let blank = handle_replace_todo(&replace(Uuid::now_v7(), " "), &s.todos).await;
        let missing = handle_replace_todo(&replace(Uuid::now_v7(), "run"), &s.todos).await;

        assert!(matches!(blank, Err(DomainError::Validation(_))));
        assert!(matches!(missing, Err(DomainError::NotFound { .. })));
    }
}
