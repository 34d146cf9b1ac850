//! The USER read model.

use exhorse_core::entity::ProjectionState;
use exhorse_core::error::DomainError;
use exhorse_core::event::{DEFAULT_READ_MODEL, StoredEvent};
use exhorse_store::{ProjectionDefinition, ProjectionRegistry};
use serde_json::{Value, json};

use crate::domain::events::{LOGIN_EVENT_TYPE, LoginAttempted, USER_AGGREGATE};

/// The `USER/DEFAULT` projection: unique usernames and login bookkeeping.
///
/// # Errors
///
/// Returns `DomainError::DuplicateHandler` if handler registration fails.
pub fn user_projection() -> Result<ProjectionDefinition, DomainError> {
    ProjectionDefinition::new(USER_AGGREGATE, DEFAULT_READ_MODEL)
        .with_unique_field("username")
        .on(LOGIN_EVENT_TYPE, apply_login)
}

/// Adds every USER projection to `registry`.
///
/// # Errors
///
/// Returns `DomainError` if a projection is already registered.
pub fn register(registry: &mut ProjectionRegistry) -> Result<(), DomainError> {
    registry.register(user_projection()?)
}

/// Folds a successful `LOGIN` into `lastLoginAt` and `loginCount`.
/// Failed attempts and attempts for unknown users leave state alone.
pub fn apply_login(state: &mut ProjectionState, event: &StoredEvent) {
    let Ok(login) = serde_json::from_value::<LoginAttempted>(event.payload.clone()) else {
        return;
    };
    if !login.succeeded {
        return;
    }
    let Some(user) = event.aggregate_id.and_then(|id| state.get_mut(&id)) else {
        return;
    };
    let count = user
        .field("loginCount")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    user.fields
        .insert("lastLoginAt".into(), json!(event.occurred_at.to_rfc3339()));
    user.fields.insert("loginCount".into(), json!(count + 1));
    user.updated_at = event.occurred_at;
}
