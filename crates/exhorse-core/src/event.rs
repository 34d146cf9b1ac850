//! Event records and their ordering.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The read model every aggregate gets when none is named.
pub const DEFAULT_READ_MODEL: &str = "DEFAULT";

/// What an event does to its aggregate.
///
/// The four mutation kinds are folded by the engine itself; any other name is
/// a domain-specific kind resolved through a registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Mints a new entity.
    Create,
    /// Replaces an entity's fields.
    Update,
    /// Deep-merges into an entity's fields.
    Patch,
    /// Deletes an entity.
    Remove,
    /// A domain-specific kind such as `LOGIN`.
    Custom(String),
}

impl EventKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Patch => "PATCH",
            Self::Remove => "REMOVE",
            Self::Custom(name) => name,
        }
    }

    /// Returns `true` for the four kinds the engine folds without a handler.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        match name {
            "CREATE" => Self::Create,
            "UPDATE" => Self::Update,
            "PATCH" => Self::Patch,
            "REMOVE" => Self::Remove,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        match Self::from(name.as_str()) {
            Self::Custom(_) => Self::Custom(name),
            builtin => builtin,
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position in an event stream: the `(occurred_at, event_id)` of the last
/// event folded. Ordered by timestamp with the event ID breaking ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    /// Timestamp of the event.
    pub occurred_at: DateTime<Utc>,
    /// Identifier of the event.
    pub event_id: Uuid,
}

impl Ord for Watermark {
    fn cmp(&self, other: &Self) -> Ordering {
        self.occurred_at
            .cmp(&other.occurred_at)
            .then_with(|| self.event_id.cmp(&other.event_id))
    }
}

impl PartialOrd for Watermark {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Persisted representation of an event. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    /// Unique, time-ordered event identifier.
    pub event_id: Uuid,
    /// Stream this event belongs to (`USER`, `TODO`, ...).
    pub aggregate_name: String,
    /// Entity affected. `None` for events not tied to a known entity.
    pub aggregate_id: Option<Uuid>,
    /// Restricts the event to one read model. `None` feeds all of them.
    pub read_model: Option<String>,
    /// What the event does.
    pub kind: EventKind,
    /// Kind-specific data.
    pub payload: serde_json::Value,
    /// Caller that produced the event.
    pub actor: Option<String>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Returns this event's position in its stream.
    #[must_use]
    pub fn watermark(&self) -> Watermark {
        Watermark {
            occurred_at: self.occurred_at,
            event_id: self.event_id,
        }
    }

    /// Returns `true` if the event feeds the given read model.
    #[must_use]
    pub fn feeds(&self, read_model: &str) -> bool {
        self.read_model.as_deref().is_none_or(|rm| rm == read_model)
    }
}
