//! Query handlers for the USER context.
//!
//! These read the rehydrated USER projection and return views that never
//! expose the password hash.

use chrono::{DateTime, Utc};
use exhorse_core::entity::Entity;
use exhorse_core::error::DomainError;
use exhorse_store::{AggregateStore, Filter, FindQuery};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::domain::events::ACCOUNT_FIELDS;

/// Read-only view of a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// The user identifier.
    pub user_id: Uuid,
    /// Unique username.
    pub username: String,
    /// Access role.
    pub role: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account last changed.
    pub updated_at: DateTime<Utc>,
    /// Time of the last successful sign-in, RFC 3339.
    pub last_login_at: Option<String>,
    /// Number of successful sign-ins.
    pub login_count: u64,
    /// Free-form profile fields.
    pub profile: Map<String, Value>,
}

impl UserView {
    /// Builds the view from a projected user entity.
    #[must_use]
    pub fn from_entity(entity: &Entity) -> Self {
        let text = |name: &str| entity.field(name).and_then(Value::as_str).map(str::to_owned);
        Self {
            user_id: entity.id,
            username: text("username").unwrap_or_default(),
            role: text("role").unwrap_or_default(),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            last_login_at: text("lastLoginAt"),
            login_count: entity
                .field("loginCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            profile: entity
                .fields
                .iter()
                .filter(|(name, _)| !ACCOUNT_FIELDS.contains(&name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// One page of users.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    /// Users matching the filter, ignoring the window.
    pub total: usize,
    /// Limit that was applied.
    pub limit: Option<usize>,
    /// ID to continue after.
    pub cursor: Option<Uuid>,
    /// Users on this page.
    pub data: Vec<UserView>,
}

/// Retrieves a user by ID.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if no such user exists.
pub async fn get_user_by_id(user_id: Uuid, users: &AggregateStore) -> Result<UserView, DomainError> {
    users.get(user_id).await.map(|entity| UserView::from_entity(&entity))
}

/// Retrieves a user by username.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if no such user exists.
pub async fn get_user_by_username(
    username: &str,
    users: &AggregateStore,
) -> Result<UserView, DomainError> {
    users
        .get_one(&Filter::eq("username", username))
        .await
        .map(|entity| UserView::from_entity(&entity))
}

/// Lists users.
///
/// When the log is unavailable the last snapshot is served instead, which
/// may trail recent writes.
///
/// # Errors
///
/// - `DomainError::InvalidQuery` if the filter or sort reads the password
///   hash.
/// - Any other `DomainError` if rehydration fails for another reason, or if
///   the snapshot cannot be read either.
pub async fn list_users(query: &FindQuery, users: &AggregateStore) -> Result<UserPage, DomainError> {
    if query.references("password") {
        return Err(DomainError::InvalidQuery(
            "password cannot be filtered or sorted on".into(),
        ));
    }
    let page = match users.find(query).await {
        Ok(page) => page,
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "event log unavailable, serving cached users");
            users.find_cached(query).await?
        }
        Err(e) => return Err(e),
    };
    Ok(UserPage {
        total: page.total,
        limit: page.limit,
        cursor: page.cursor,
        data: page.data.iter().map(UserView::from_entity).collect(),
    })
}
