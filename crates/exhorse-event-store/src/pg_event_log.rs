//! `PostgreSQL` implementation of the `EventLog` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use exhorse_core::error::DomainError;
use exhorse_core::event::StoredEvent;
use exhorse_core::repository::{EventFilter, EventLog};

/// PostgreSQL-backed event log.
#[derive(Debug, Clone)]
pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    /// Creates a new `PgEventLog`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct EventRow {
    event_id: Uuid,
    aggregate_name: String,
    aggregate_id: Option<Uuid>,
    read_model: Option<String>,
    kind: String,
    payload: serde_json::Value,
    actor: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            aggregate_name: row.aggregate_name,
            aggregate_id: row.aggregate_id,
            read_model: row.read_model,
            kind: row.kind.into(),
            payload: row.payload,
            actor: row.actor,
            occurred_at: row.occurred_at,
        }
    }
}

pub(crate) fn storage(e: sqlx::Error) -> DomainError {
    DomainError::Storage(e.to_string())
}

/// Pushes `filter` down as a `WHERE` clause ordered by watermark.
fn build_fetch(filter: &EventFilter) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(
        "SELECT event_id, aggregate_name, aggregate_id, read_model, kind, payload, actor, occurred_at \
         FROM events WHERE aggregate_name = ",
    );
    query.push_bind(filter.aggregate_name.as_str());

    if let Some(read_model) = &filter.read_model {
        query
            .push(" AND (read_model IS NULL OR read_model = ")
            .push_bind(read_model.as_str())
            .push(")");
    }
    if let Some(after) = filter.after {
        query
            .push(" AND (occurred_at, event_id) > (")
            .push_bind(after.occurred_at)
            .push(", ")
            .push_bind(after.event_id)
            .push(")");
    }
    if let Some(until) = filter.until {
        query
            .push(" AND (occurred_at, event_id) <= (")
            .push_bind(until.occurred_at)
            .push(", ")
            .push_bind(until.event_id)
            .push(")");
    }
    if let Some(ids) = &filter.aggregate_ids {
        query
            .push(" AND (aggregate_id = ANY(")
            .push_bind(ids.clone())
            .push(")");
        if filter.include_creations {
            query.push(" OR kind = 'CREATE'");
        }
        query.push(")");
    }

    query.push(" ORDER BY occurred_at, event_id");
    query
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(&self, event: StoredEvent) -> Result<Uuid, DomainError> {
        sqlx::query(
            "INSERT INTO events \
             (event_id, aggregate_name, aggregate_id, read_model, kind, payload, actor, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.event_id)
        .bind(&event.aggregate_name)
        .bind(event.aggregate_id)
        .bind(&event.read_model)
        .bind(event.kind.as_str())
        .bind(&event.payload)
        .bind(&event.actor)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        debug!(
            event_id = %event.event_id,
            aggregate = %event.aggregate_name,
            kind = %event.kind,
            "event appended"
        );
        Ok(event.event_id)
    }

    async fn fetch(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, DomainError> {
        let rows: Vec<EventRow> = build_fetch(filter)
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }
}
