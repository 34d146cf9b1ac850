//! Projection registry: which read models exist, how they fold, and which
//! other read models they cascade from.
//!
//! The registry is built once at start-up and shared behind an `Arc`; it is
//! not mutated afterwards.

use std::collections::HashMap;

use exhorse_core::error::DomainError;
use exhorse_core::event::EventKind;
use exhorse_core::fold::{EventHandler, Reducer};

/// Formats the `aggregate/read_model` key used in logs, errors and snapshot
/// dependency watermarks.
#[must_use]
pub fn projection_key(aggregate_name: &str, read_model: &str) -> String {
    format!("{aggregate_name}/{read_model}")
}

/// A foreign read model whose events feed a local one.
#[derive(Debug, Clone)]
pub struct Dependency {
    /// Aggregate whose events are consumed.
    pub aggregate_name: String,
    /// Read model of that aggregate to follow.
    pub read_model: String,
    /// Folds one foreign event into the local state.
    pub handler: EventHandler,
}

impl Dependency {
    /// Key under which the consumed watermark is stored.
    #[must_use]
    pub fn key(&self) -> String {
        projection_key(&self.aggregate_name, &self.read_model)
    }
}

/// Everything needed to rehydrate one `(aggregate, read_model)`.
#[derive(Debug, Clone)]
pub struct ProjectionDefinition {
    aggregate_name: String,
    read_model: String,
    reducer: Reducer,
    dependencies: Vec<Dependency>,
}

impl ProjectionDefinition {
    /// A projection that folds only the built-in kinds.
    #[must_use]
    pub fn new(aggregate_name: impl Into<String>, read_model: impl Into<String>) -> Self {
        let aggregate_name = aggregate_name.into();
        let read_model = read_model.into();
        Self {
            reducer: Reducer::new(projection_key(&aggregate_name, &read_model)),
            aggregate_name,
            read_model,
            dependencies: Vec::new(),
        }
    }

    /// Declares a field that must stay unique across entities.
    #[must_use]
    pub fn with_unique_field(mut self, field: impl Into<String>) -> Self {
        self.reducer = self.reducer.with_unique_field(field);
        self
    }

    /// Adds a handler for a domain-specific event kind.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateHandler` if the kind is built-in or
    /// already handled.
    pub fn on(mut self, kind: impl Into<EventKind>, handler: EventHandler) -> Result<Self, DomainError> {
        self.reducer.register(kind, handler)?;
        Ok(self)
    }

    /// Makes this read model cascade from `foreign_aggregate/foreign_read_model`:
    /// that projection is rehydrated first and each of its new events is
    /// folded here with `handler`.
    #[must_use]
    pub fn depends_on(
        mut self,
        foreign_aggregate: impl Into<String>,
        foreign_read_model: impl Into<String>,
        handler: EventHandler,
    ) -> Self {
        self.dependencies.push(Dependency {
            aggregate_name: foreign_aggregate.into(),
            read_model: foreign_read_model.into(),
            handler,
        });
        self
    }

    /// Aggregate this projection reads.
    #[must_use]
    pub fn aggregate_name(&self) -> &str {
        &self.aggregate_name
    }

    /// Read model discriminator.
    #[must_use]
    pub fn read_model(&self) -> &str {
        &self.read_model
    }

    /// The local fold.
    #[must_use]
    pub fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    /// Foreign read models, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// `aggregate/read_model`.
    #[must_use]
    pub fn key(&self) -> String {
        projection_key(&self.aggregate_name, &self.read_model)
    }
}

/// All known projections, keyed by `(aggregate, read_model)`.
#[derive(Debug, Clone, Default)]
pub struct ProjectionRegistry {
    definitions: HashMap<(String, String), ProjectionDefinition>,
}

impl ProjectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a projection. Dependencies may name projections registered
    /// later; they are resolved at rehydration time.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the projection is already
    /// registered.
    pub fn register(&mut self, definition: ProjectionDefinition) -> Result<(), DomainError> {
        let key = (
            definition.aggregate_name.clone(),
            definition.read_model.clone(),
        );
        if self.definitions.contains_key(&key) {
            return Err(DomainError::Validation(format!(
                "projection {} registered twice",
                definition.key()
            )));
        }
        self.definitions.insert(key, definition);
        Ok(())
    }

    /// Looks up a projection.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownProjection` if it was never registered.
    pub fn get(
        &self,
        aggregate_name: &str,
        read_model: &str,
    ) -> Result<&ProjectionDefinition, DomainError> {
        self.definitions
            .get(&(aggregate_name.to_owned(), read_model.to_owned()))
            .ok_or_else(|| DomainError::UnknownProjection(projection_key(aggregate_name, read_model)))
    }

    /// Returns `true` if the projection is registered.
    #[must_use]
    pub fn contains(&self, aggregate_name: &str, read_model: &str) -> bool {
        self.definitions
            .contains_key(&(aggregate_name.to_owned(), read_model.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use exhorse_core::entity::ProjectionState;
    use exhorse_core::event::StoredEvent;

    use super::*;

    fn noop(_state: &mut ProjectionState, _event: &StoredEvent) {}

    #[test]
    fn test_register_and_get() {
        // Arrange
        let mut registry = ProjectionRegistry::new();
        let definition = ProjectionDefinition::new("TODO", "WITH_AUTHOR")
            .depends_on("USER", "DEFAULT", noop);

        // Act
        registry.register(definition).unwrap();

        // Assert
        let found = registry.get("TODO", "WITH_AUTHOR").unwrap();
        assert_eq!(found.key(), "TODO/WITH_AUTHOR");
        assert_eq!(found.dependencies().len(), 1);
        assert_eq!(found.dependencies()[0].key(), "USER/DEFAULT");
        assert!(registry.contains("TODO", "WITH_AUTHOR"));
        assert!(!registry.contains("TODO", "DEFAULT"));
    }

    #[test]
    fn test_unknown_projection() {
        let registry = ProjectionRegistry::new();

        match registry.get("TODO", "DEFAULT") {
            Err(DomainError::UnknownProjection(key)) => assert_eq!(key, "TODO/DEFAULT"),
            other => panic!("expected UnknownProjection, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_projection_rejected() {
        let mut registry = ProjectionRegistry::new();
        registry
            .register(ProjectionDefinition::new("TODO", "DEFAULT"))
            .unwrap();

        let result = registry.register(ProjectionDefinition::new("TODO", "DEFAULT"));

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_duplicate_handler_rejected() {
        let result = ProjectionDefinition::new("USER", "DEFAULT")
            .on("LOGIN", noop)
            .and_then(|definition| definition.on("LOGIN", noop));

        match result {
            Err(DomainError::DuplicateHandler { projection, kind }) => {
                assert_eq!(projection, "USER/DEFAULT");
                assert_eq!(kind, "LOGIN");
            }
            other => panic!("expected DuplicateHandler, got {other:?}"),
        }
    }
}
