//! Route modules organized by bounded context, plus the request pieces
//! they share.

pub mod health;
pub mod todos;
pub mod users;

use axum::http::HeaderMap;
use exhorse_core::error::DomainError;
use exhorse_store::{FindQuery, Rehydrated};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Header naming the caller; stored verbatim on every event it causes.
pub const ACTOR_HEADER: &str = "x-actor";

/// Reads the caller from [`ACTOR_HEADER`], if present and valid UTF-8.
#[must_use]
pub fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Query-string form of a find request. `filter` and `sort` carry the same
/// JSON documents a `POST .../find` body would.
#[derive(Debug, Default, Deserialize)]
pub struct FindParams {
    /// JSON filter document.
    pub filter: Option<String>,
    /// JSON sort document.
    pub sort: Option<String>,
    /// Entities to skip, in offset mode.
    pub skip: Option<usize>,
    /// Page size.
    pub limit: Option<usize>,
    /// ID to continue after; selects cursor mode.
    pub cursor: Option<Uuid>,
}

impl FindParams {
    /// Converts the parameters into a query.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidQuery` if `filter` or `sort` is not a
    /// valid document.
    pub fn into_query(self, default_limit: usize) -> Result<FindQuery, DomainError> {
        let mut document = Map::new();
        if let Some(filter) = self.filter {
            document.insert("filter".into(), parse_json("filter", &filter)?);
        }
        if let Some(sort) = self.sort {
            document.insert("sort".into(), parse_json("sort", &sort)?);
        }
        if let Some(skip) = self.skip {
            document.insert("skip".into(), Value::from(skip));
        }
        if let Some(limit) = self.limit {
            document.insert("limit".into(), Value::from(limit));
        }
        if let Some(cursor) = self.cursor {
            document.insert("cursor".into(), Value::String(cursor.to_string()));
        }
        FindQuery::from_document(&Value::Object(document), default_limit)
    }
}

fn parse_json(name: &str, raw: &str) -> Result<Value, DomainError> {
    serde_json::from_str(raw)
        .map_err(|e| DomainError::InvalidQuery(format!("{name} is not valid JSON: {e}")))
}

/// Response body of a rebuild.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildResponse {
    /// Events replayed.
    pub folded: usize,
    /// Entities in the rebuilt state.
    pub entities: usize,
    /// Whether the new snapshot was written.
    pub persisted: bool,
}

impl From<Rehydrated> for RebuildResponse {
    fn from(rebuilt: Rehydrated) -> Self {
        Self {
            folded: rebuilt.folded,
            entities: rebuilt.state.len(),
            persisted: rebuilt.persisted,
        }
    }
}
