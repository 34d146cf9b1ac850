//! Command handlers for the USER context.
//!
//! Each handler validates the command against the current USER projection,
//! appends its event through the aggregate store and returns the refreshed
//! view.

use exhorse_core::command::Command;
use exhorse_core::entity::Entity;
use exhorse_core::error::DomainError;
use exhorse_store::{AggregateStore, EventDraft, Filter};
use serde_json::{Map, Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::query_handlers::{UserView, get_user_by_id};
use crate::domain::commands::{DeleteUser, RenameUser, ReplaceUser, SignIn, SignUp};
use crate::domain::events::{ACCOUNT_FIELDS, LOGIN_EVENT_TYPE, ROLE_MEMBER};
use crate::domain::password::PasswordHasher;

fn require(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

async fn find_by_username(
    username: &str,
    users: &AggregateStore,
) -> Result<Option<Entity>, DomainError> {
    match users.get_one(&Filter::eq("username", username)).await {
        Ok(entity) => Ok(Some(entity)),
        Err(DomainError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn ensure_username_free(
    username: &str,
    user_id: Uuid,
    users: &AggregateStore,
) -> Result<(), DomainError> {
    match find_by_username(username, users).await? {
        Some(holder) if holder.id != user_id => Err(DomainError::Conflict(format!(
            "User {username} already exists."
        ))),
        _ => Ok(()),
    }
}

/// Handles the `SignUp` command: rejects a taken username, hashes the
/// password and creates the account with the member role.
///
/// # Errors
///
/// - `DomainError::Validation` if the username or password is empty.
/// - `DomainError::Conflict` if the username is taken.
/// - `DomainError::Storage` if the log cannot be read or written.
pub async fn handle_sign_up(
    command: &SignUp,
    hasher: &PasswordHasher,
    users: &AggregateStore,
) -> Result<UserView, DomainError> {
    require("username", &command.username)?;
    require("password", &command.password)?;

    if find_by_username(&command.username, users).await?.is_some() {
        return Err(DomainError::Conflict(format!(
            "User {} already exists.",
            command.username
        )));
    }

    let created = users
        .create(
            command.actor(),
            json!({
                "username": command.username,
                "password": hasher.hash(&command.password)?,
                "role": ROLE_MEMBER,
            }),
        )
        .await?;

    info!(
        command = command.command_type(),
        user_id = %created.id,
        "user signed up"
    );
    Ok(UserView::from_entity(&created))
}

/// Handles the `SignIn` command: records a `LOGIN` event for the attempt,
/// then succeeds only if the password matches.
///
/// # Errors
///
/// - `DomainError::InvalidCredentials` if the user is unknown or the
///   password does not match.
/// - `DomainError::Storage` if the log cannot be read or written.
pub async fn handle_sign_in(
    command: &SignIn,
    hasher: &PasswordHasher,
    users: &AggregateStore,
) -> Result<UserView, DomainError> {
    let user = find_by_username(&command.username, users).await?;
    let succeeded = user
        .as_ref()
        .and_then(|u| u.field("password"))
        .and_then(Value::as_str)
        .is_some_and(|stored| hasher.verify(&command.password, stored));

    users
        .record(
            command.actor(),
            EventDraft::new(
                LOGIN_EVENT_TYPE,
                user.as_ref().map(|u| u.id),
                json!({"username": command.username, "succeeded": succeeded}),
            ),
        )
        .await?;

    match user {
        Some(user) if succeeded => {
            info!(command = command.command_type(), user_id = %user.id, "user signed in");
            get_user_by_id(user.id, users).await
        }
        _ => {
            warn!(command = command.command_type(), username = %command.username, "sign-in rejected");
            Err(DomainError::InvalidCredentials)
        }
    }
}

/// Handles the `RenameUser` command.
///
/// # Errors
///
/// - `DomainError::Validation` if the username is empty.
/// - `DomainError::Conflict` if another user has the username.
/// - `DomainError::NotFound` if the user does not exist.
pub async fn handle_rename_user(
    command: &RenameUser,
    users: &AggregateStore,
) -> Result<UserView, DomainError> {
    require("username", &command.username)?;
    ensure_username_free(&command.username, command.user_id, users).await?;

    let patched = users
        .patch(
            command.actor(),
            command.user_id,
            json!({"username": command.username}),
        )
        .await?;
    Ok(UserView::from_entity(&patched))
}

/// Handles the `ReplaceUser` command: a full replace of the username and
/// profile. The password hash, role and login bookkeeping carry over from
/// the current state, and any profile keys naming them are ignored.
///
/// # Errors
///
/// - `DomainError::Validation` if the username is empty.
/// - `DomainError::Conflict` if another user has the username.
/// - `DomainError::NotFound` if the user does not exist.
pub async fn handle_replace_user(
    command: &ReplaceUser,
    users: &AggregateStore,
) -> Result<UserView, DomainError> {
    require("username", &command.username)?;
    ensure_username_free(&command.username, command.user_id, users).await?;
    let current = users.get(command.user_id).await?;

    let mut payload: Map<String, Value> = command
        .profile
        .iter()
        .filter(|(name, _)| !ACCOUNT_FIELDS.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    for name in ACCOUNT_FIELDS {
        if let Some(value) = current.field(name) {
            payload.insert(name.to_owned(), value.clone());
        }
    }
    payload.insert("username".into(), json!(command.username));

    let replaced = users
        .update(command.actor(), command.user_id, Value::Object(payload))
        .await?;
    info!(
        command = command.command_type(),
        user_id = %replaced.id,
        "user replaced"
    );
    Ok(UserView::from_entity(&replaced))
}

/// Handles the `DeleteUser` command. Deleting an unknown user is a no-op
/// returning `None`.
///
/// # Errors
///
/// Returns `DomainError::Storage` if the log cannot be read or written.
pub async fn handle_delete_user(
    command: &DeleteUser,
    users: &AggregateStore,
) -> Result<Option<UserView>, DomainError> {
    let removed = users.remove(command.actor(), command.user_id).await?;
    Ok(removed.as_ref().map(UserView::from_entity))
}
