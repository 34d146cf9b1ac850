//! Projected entity documents and the state that holds them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Document keys owned by the engine. Payloads never write them.
pub const RESERVED_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// Materialized result of folding the events of one aggregate ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Timestamp of the `CREATE` event.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the latest event applied.
    pub updated_at: DateTime<Utc>,
    /// Domain payload fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity {
    /// Creates an entity from a payload, dropping reserved keys.
    #[must_use]
    pub fn new(id: Uuid, at: DateTime<Utc>, fields: Map<String, Value>) -> Self {
        Self {
            id,
            created_at: at,
            updated_at: at,
            fields: without_reserved(fields),
        }
    }

    /// Returns a domain field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Renders the entity as a single JSON object, the shape queries run on.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let mut doc = self.fields.clone();
        doc.insert("id".into(), Value::String(self.id.to_string()));
        doc.insert(
            "createdAt".into(),
            Value::String(self.created_at.to_rfc3339()),
        );
        doc.insert(
            "updatedAt".into(),
            Value::String(self.updated_at.to_rfc3339()),
        );
        Value::Object(doc)
    }
}

/// Strips engine-owned keys from a payload object.
#[must_use]
pub fn without_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_FIELDS {
        fields.remove(key);
    }
    fields
}

/// The current entities of one projection, keyed and iterated by ID.
///
/// Aggregate IDs are time-ordered, so iteration order is creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Entity>", into = "Vec<Entity>")]
pub struct ProjectionState {
    entities: BTreeMap<Uuid, Entity>,
}

impl ProjectionState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns the entity with the given ID.
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Returns the entity with the given ID for in-place mutation.
    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Inserts or replaces an entity.
    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    /// Removes an entity, returning it if it was live.
    pub fn remove(&mut self, id: &Uuid) -> Option<Entity> {
        self.entities.remove(id)
    }

    /// Iterates entities in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Iterates entities in creation order for mutation.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }
}

impl From<Vec<Entity>> for ProjectionState {
    fn from(entities: Vec<Entity>) -> Self {
        Self {
            entities: entities.into_iter().map(|e| (e.id, e)).collect(),
        }
    }
}

impl From<ProjectionState> for Vec<Entity> {
    fn from(state: ProjectionState) -> Self {
        state.entities.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_entity_drops_reserved_keys() {
        let id = Uuid::now_v7();
        let entity = Entity::new(
            id,
            at(),
            fields(json!({"id": "spoofed", "createdAt": "never", "title": "A"})),
        );

        assert_eq!(entity.id, id);
        assert_eq!(entity.field("title"), Some(&json!("A")));
        assert!(entity.field("id").is_none());
        assert!(entity.field("createdAt").is_none());
    }

    #[test]
    fn test_to_document_exposes_identity_and_timestamps() {
        let id = Uuid::now_v7();
        let doc = Entity::new(id, at(), fields(json!({"title": "A"}))).to_document();

        assert_eq!(doc["id"], json!(id.to_string()));
        assert_eq!(doc["title"], json!("A"));
        assert_eq!(doc["createdAt"], json!(at().to_rfc3339()));
    }

    #[test]
    fn test_state_serializes_as_array_in_creation_order() {
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();
        let mut state = ProjectionState::new();
        state.insert(Entity::new(second, at(), fields(json!({"n": 2}))));
        state.insert(Entity::new(first, at(), fields(json!({"n": 1}))));

        let json = serde_json::to_value(&state).unwrap();
        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["n"], json!(1));
        assert_eq!(items[1]["n"], json!(2));

        let back: ProjectionState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
