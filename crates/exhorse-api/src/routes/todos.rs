//! Routes for the TODO bounded context.
//!
//! `GET /with-author` and `POST /with-author/find` read the `WITH_AUTHOR`
//! projection; every other read uses `DEFAULT`.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use exhorse_core::event::StoredEvent;
use exhorse_store::FindQuery;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use exhorse_todo::application::query_handlers::{self, TodoPage, TodoView};
use exhorse_todo::application::command_handlers;
use exhorse_todo::domain::commands;

use crate::error::ApiError;
use crate::routes::{FindParams, RebuildResponse, actor};
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoRequest {
    /// User who owns the todo.
    pub author_id: Uuid,
    /// Short description.
    pub title: String,
    /// Initial tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request body for PATCH /{todo_id}.
#[derive(Debug, Deserialize)]
pub struct PatchTodoRequest {
    /// New title.
    pub title: Option<String>,
    /// Tags to add.
    pub tags: Option<Vec<String>>,
}

/// Request body for PUT /{todo_id}.
#[derive(Debug, Deserialize)]
pub struct ReplaceTodoRequest {
    /// New title.
    pub title: String,
    /// The complete tag list; empty when absent.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// POST /
#[instrument(skip(state, headers, request), fields(author_id = %request.author_id))]
async fn create_todo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTodoRequest>,
) -> Result<(StatusCode, Json<TodoView>), ApiError> {
    let command = commands::CreateTodo {
        actor: actor(&headers),
        author_id: request.author_id,
        title: request.title,
        tags: request.tags,
    };

    let todo = command_handlers::handle_create_todo(&command, &state.users, &state.todos).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

/// GET /
async fn list_todos(
    State(state): State<AppState>,
    Query(params): Query<FindParams>,
) -> Result<Json<TodoPage>, ApiError> {
    let query = params.into_query(state.page_limit)?;
    Ok(Json(query_handlers::list_todos(&query, &state.todos).await?))
}

/// POST /find
async fn find_todos(
    State(state): State<AppState>,
    Json(document): Json<Value>,
) -> Result<Json<TodoPage>, ApiError> {
    let query = FindQuery::from_document(&document, state.page_limit)?;
    Ok(Json(query_handlers::list_todos(&query, &state.todos).await?))
}

/// GET /with-author
async fn list_todos_with_author(
    State(state): State<AppState>,
    Query(params): Query<FindParams>,
) -> Result<Json<TodoPage>, ApiError> {
    let query = params.into_query(state.page_limit)?;
    Ok(Json(
        query_handlers::list_todos(&query, &state.todos_with_author).await?,
    ))
}

/// POST /with-author/find
async fn find_todos_with_author(
    State(state): State<AppState>,
    Json(document): Json<Value>,
) -> Result<Json<TodoPage>, ApiError> {
    let query = FindQuery::from_document(&document, state.page_limit)?;
    Ok(Json(
        query_handlers::list_todos(&query, &state.todos_with_author).await?,
    ))
}

/// GET /{todo_id}
async fn get_todo(
    State(state): State<AppState>,
    Path(todo_id): Path<Uuid>,
) -> Result<Json<TodoView>, ApiError> {
    Ok(Json(query_handlers::get_todo(todo_id, &state.todos).await?))
}

/// PATCH /{todo_id}
#[instrument(skip(state, headers, request), fields(todo_id = %todo_id))]
async fn patch_todo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(todo_id): Path<Uuid>,
    Json(request): Json<PatchTodoRequest>,
) -> Result<Json<TodoView>, ApiError> {
    let command = commands::PatchTodo {
        actor: actor(&headers),
        todo_id,
        title: request.title,
        tags: request.tags,
    };

    Ok(Json(
        command_handlers::handle_patch_todo(&command, &state.todos).await?,
    ))
}

/// PUT /{todo_id}
#[instrument(skip(state, headers, request), fields(todo_id = %todo_id))]
async fn replace_todo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(todo_id): Path<Uuid>,
    Json(request): Json<ReplaceTodoRequest>,
) -> Result<Json<TodoView>, ApiError> {
    let command = commands::ReplaceTodo {
        actor: actor(&headers),
        todo_id,
        title: request.title,
        tags: request.tags,
    };

    Ok(Json(
        command_handlers::handle_replace_todo(&command, &state.todos).await?,
    ))
}

/// POST /{todo_id}/complete
#[instrument(skip(state, headers), fields(todo_id = %todo_id))]
async fn complete_todo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(todo_id): Path<Uuid>,
) -> Result<Json<TodoView>, ApiError> {
    let command = commands::CompleteTodo {
        actor: actor(&headers),
        todo_id,
    };

    Ok(Json(
        command_handlers::handle_complete_todo(&command, &state.todos).await?,
    ))
}

/// DELETE /{todo_id}; 204 when there was nothing to delete.
#[instrument(skip(state, headers), fields(todo_id = %todo_id))]
async fn delete_todo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(todo_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let command = commands::DeleteTodo {
        actor: actor(&headers),
        todo_id,
    };

    Ok(
        match command_handlers::handle_delete_todo(&command, &state.todos).await? {
            Some(todo) => Json(todo).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
    )
}

/// GET /{todo_id}/history
async fn todo_history(
    State(state): State<AppState>,
    Path(todo_id): Path<Uuid>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    Ok(Json(state.todos.history(todo_id).await?))
}

/// POST /rebuild; rebuilds both TODO read models.
#[instrument(skip(state))]
async fn rebuild_todos(
    State(state): State<AppState>,
) -> Result<Json<Vec<RebuildResponse>>, ApiError> {
    let plain = state.todos.rebuild().await?;
    let with_author = state.todos_with_author.rebuild().await?;
    Ok(Json(vec![plain.into(), with_author.into()]))
}

/// Returns the router for the TODO context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_todos).post(create_todo))
        .route("/find", post(find_todos))
        .route("/with-author", get(list_todos_with_author))
        .route("/with-author/find", post(find_todos_with_author))
        .route("/rebuild", post(rebuild_todos))
        .route(
            "/{todo_id}",
            get(get_todo)
                .put(replace_todo)
                .patch(patch_todo)
                .delete(delete_todo),
        )
        .route("/{todo_id}/complete", post(complete_todo))
        .route("/{todo_id}/history", get(todo_history))
}
