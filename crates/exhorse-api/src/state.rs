//! Shared application state.

use std::sync::Arc;

use exhorse_core::error::DomainError;
use exhorse_core::event::DEFAULT_READ_MODEL;
use exhorse_store::{AggregateStore, ProjectionRegistry, Rehydrator};
use exhorse_todo::domain::events::{TODO_AGGREGATE, WITH_AUTHOR_READ_MODEL};
use exhorse_users::domain::events::USER_AGGREGATE;
use exhorse_users::domain::password::PasswordHasher;

/// Builds the registry holding every projection the API serves.
///
/// # Errors
///
/// Returns `DomainError` if two contexts register the same projection.
pub fn projection_registry() -> Result<ProjectionRegistry, DomainError> {
    let mut registry = ProjectionRegistry::new();
    exhorse_users::domain::projection::register(&mut registry)?;
    exhorse_todo::domain::projection::register(&mut registry)?;
    Ok(registry)
}

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// `USER/DEFAULT`.
    pub users: AggregateStore,
    /// `TODO/DEFAULT`.
    pub todos: AggregateStore,
    /// `TODO/WITH_AUTHOR`.
    pub todos_with_author: AggregateStore,
    /// Password hashing for sign-up and sign-in.
    pub hasher: PasswordHasher,
    /// Page size used when a find request gives none.
    pub page_limit: usize,
}

impl AppState {
    /// Create new application state over one rehydration engine.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownProjection` if `rehydrator` lacks one of
    /// the USER or TODO projections.
    pub fn new(
        rehydrator: &Arc<Rehydrator>,
        hasher: PasswordHasher,
        page_limit: usize,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            users: AggregateStore::new(rehydrator.clone(), USER_AGGREGATE)?,
            todos: AggregateStore::for_read_model(
                rehydrator.clone(),
                TODO_AGGREGATE,
                DEFAULT_READ_MODEL,
            )?,
            todos_with_author: AggregateStore::for_read_model(
                rehydrator.clone(),
                TODO_AGGREGATE,
                WITH_AUTHOR_READ_MODEL,
            )?,
            hasher,
            page_limit,
        })
    }
}
