//! Routes for the USER bounded context.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use exhorse_core::event::StoredEvent;
use exhorse_store::FindQuery;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use exhorse_users::application::query_handlers::{self, UserPage, UserView};
use exhorse_users::application::command_handlers;
use exhorse_users::domain::commands;

use crate::error::ApiError;
use crate::routes::{FindParams, RebuildResponse, actor};
use crate::state::AppState;

/// Request body for POST /sign-up and POST /sign-in.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    /// Username.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

/// Request body for PATCH /{user_id}.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    /// New username.
    pub username: String,
}

/// Request body for PUT /{user_id}. Keys other than `username` form the
/// new profile.
#[derive(Debug, Deserialize)]
pub struct ReplaceRequest {
    /// New username.
    pub username: String,
    /// Profile fields.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

/// POST /sign-up
#[instrument(skip(state, headers, request), fields(username = %request.username))]
async fn sign_up(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let command = commands::SignUp {
        actor: actor(&headers),
        username: request.username,
        password: request.password,
    };

    info!("handling sign_up command");

    let user = command_handlers::handle_sign_up(&command, &state.hasher, &state.users).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /sign-in
#[instrument(skip(state, headers, request), fields(username = %request.username))]
async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<UserView>, ApiError> {
    let command = commands::SignIn {
        actor: actor(&headers),
        username: request.username,
        password: request.password,
    };

    let user = command_handlers::handle_sign_in(&command, &state.hasher, &state.users).await?;
    Ok(Json(user))
}

/// GET /
async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<FindParams>,
) -> Result<Json<UserPage>, ApiError> {
    let query = params.into_query(state.page_limit)?;
    Ok(Json(query_handlers::list_users(&query, &state.users).await?))
}

/// POST /find
async fn find_users(
    State(state): State<AppState>,
    Json(document): Json<Value>,
) -> Result<Json<UserPage>, ApiError> {
    let query = FindQuery::from_document(&document, state.page_limit)?;
    Ok(Json(query_handlers::list_users(&query, &state.users).await?))
}

/// GET /{user_id}
async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserView>, ApiError> {
    Ok(Json(query_handlers::get_user_by_id(user_id, &state.users).await?))
}

/// PATCH /{user_id}
#[instrument(skip(state, headers, request), fields(user_id = %user_id))]
async fn rename_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<UserView>, ApiError> {
    let command = commands::RenameUser {
        actor: actor(&headers),
        user_id,
        username: request.username,
    };

    Ok(Json(
        command_handlers::handle_rename_user(&command, &state.users).await?,
    ))
}

/// PUT /{user_id}
#[instrument(skip(state, headers, request), fields(user_id = %user_id))]
async fn replace_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(request): Json<ReplaceRequest>,
) -> Result<Json<UserView>, ApiError> {
    let command = commands::ReplaceUser {
        actor: actor(&headers),
        user_id,
        username: request.username,
        profile: request.profile,
    };

    Ok(Json(
        command_handlers::handle_replace_user(&command, &state.users).await?,
    ))
}

/// DELETE /{user_id}; 204 when there was nothing to delete.
#[instrument(skip(state, headers), fields(user_id = %user_id))]
async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let command = commands::DeleteUser {
        actor: actor(&headers),
        user_id,
    };

    Ok(
        match command_handlers::handle_delete_user(&command, &state.users).await? {
            Some(user) => Json(user).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
    )
}

/// GET /{user_id}/history
async fn user_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    Ok(Json(state.users.history(user_id).await?))
}

/// POST /rebuild
#[instrument(skip(state))]
async fn rebuild_users(State(state): State<AppState>) -> Result<Json<RebuildResponse>, ApiError> {
    Ok(Json(state.users.rebuild().await?.into()))
}

/// Returns the router for the USER context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/find", post(find_users))
        .route("/sign-up", post(sign_up))
        .route("/sign-in", post(sign_in))
        .route("/rebuild", post(rebuild_users))
        .route(
            "/{user_id}",
            get(get_user)
                .put(replace_user)
                .patch(rename_user)
                .delete(delete_user),
        )
        .route("/{user_id}/history", get(user_history))
}
