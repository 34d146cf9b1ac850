//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
///
/// User-facing variants describe a problem with the request; the rest are
/// infrastructure or configuration failures. See [`DomainError::is_user_facing`].
#[derive(Debug, Error)]
pub enum DomainError {
    /// No entry matched after rehydration.
    #[error("no such entry in {aggregate}{}", .id.map(|id| format!(" with ID {id}")).unwrap_or_default())]
    NotFound {
        /// The aggregate that was searched.
        aggregate: String,
        /// The identifier that was requested, if the lookup was by ID.
        id: Option<Uuid>,
    },

    /// A write would violate a uniqueness rule.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A filter or sort document could not be interpreted.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Credentials did not match a known identity.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Read model dependencies form a cycle.
    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    DependencyCycle {
        /// The `aggregate/read_model` chain that closed the cycle.
        path: Vec<String>,
    },

    /// Two handlers were registered for the same event kind.
    #[error("handler for {kind} already registered on {projection}")]
    DuplicateHandler {
        /// The `aggregate/read_model` the handler was registered on.
        projection: String,
        /// The event kind registered twice.
        kind: String,
    },

    /// A rehydration targeted a projection that was never registered.
    #[error("unknown projection: {0}")]
    UnknownProjection(String),

    /// A persisted snapshot could not be decoded.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// An I/O, timeout or connection failure in the storage backend.
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Returns `true` for errors caused by the request rather than the
    /// system, which the outward adapter reports back to the caller.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Conflict(_)
                | Self::Validation(_)
                | Self::InvalidQuery(_)
                | Self::InvalidCredentials
        )
    }

    /// Returns `true` for infrastructure failures a caller may retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_includes_id() {
        let id = Uuid::nil();
        let err = DomainError::NotFound {
            aggregate: "TODO".into(),
            id: Some(id),
        };

        assert_eq!(
            err.to_string(),
            format!("no such entry in TODO with ID {id}")
        );
    }

    #[test]
    fn test_dependency_cycle_message_joins_path() {
        let err = DomainError::DependencyCycle {
            path: vec!["A/DEFAULT".into(), "B/DEFAULT".into(), "A/DEFAULT".into()],
        };

        assert_eq!(
            err.to_string(),
            "dependency cycle detected: A/DEFAULT -> B/DEFAULT -> A/DEFAULT"
        );
    }

    #[test]
    fn test_user_facing_and_retryable_are_disjoint() {
        let errors = [
            DomainError::Conflict("dup".into()),
            DomainError::InvalidCredentials,
            DomainError::Storage("down".into()),
            DomainError::DependencyCycle { path: vec![] },
        ];

        for err in &errors {
            assert!(!(err.is_user_facing() && err.is_retryable()), "{err}");
        }
        assert!(DomainError::Storage("down".into()).is_retryable());
        assert!(!DomainError::DependencyCycle { path: vec![] }.is_user_facing());
    }
}
