//! `PostgreSQL` implementation of the `SnapshotStore` trait.
//!
//! One row per `(aggregate_name, read_model)`, replaced in place. Writes
//! lock the row and compare watermarks so a slower rehydration can never
//! overwrite a snapshot that has folded more.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use exhorse_core::entity::ProjectionState;
use exhorse_core::error::DomainError;
use exhorse_core::event::Watermark;
use exhorse_core::repository::{SaveOutcome, Snapshot, SnapshotStore};

use crate::pg_event_log::storage;

/// PostgreSQL-backed snapshot cache.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Creates a new `PgSnapshotStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SnapshotRow {
    state: serde_json::Value,
    watermark_at: Option<DateTime<Utc>>,
    watermark_id: Option<Uuid>,
    dependencies: serde_json::Value,
    taken_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PositionRow {
    watermark_at: Option<DateTime<Utc>>,
    watermark_id: Option<Uuid>,
    dependencies: serde_json::Value,
}

fn watermark(
    at: Option<DateTime<Utc>>,
    id: Option<Uuid>,
) -> Result<Option<Watermark>, String> {
    match (at, id) {
        (Some(occurred_at), Some(event_id)) => Ok(Some(Watermark {
            occurred_at,
            event_id,
        })),
        (None, None) => Ok(None),
        _ => Err("half-set watermark".into()),
    }
}

fn decode(aggregate_name: &str, read_model: &str, row: SnapshotRow) -> Result<Snapshot, DomainError> {
    let corrupt = |reason: String| {
        DomainError::CorruptSnapshot(format!("{aggregate_name}/{read_model}: {reason}"))
    };
    let state: ProjectionState =
        serde_json::from_value(row.state).map_err(|e| corrupt(format!("state: {e}")))?;
    let dependencies: BTreeMap<String, Watermark> = serde_json::from_value(row.dependencies)
        .map_err(|e| corrupt(format!("dependencies: {e}")))?;
    Ok(Snapshot {
        aggregate_name: aggregate_name.to_owned(),
        read_model: read_model.to_owned(),
        state,
        watermark: watermark(row.watermark_at, row.watermark_id).map_err(corrupt)?,
        dependencies,
        taken_at: row.taken_at,
    })
}

fn encode(value: &impl serde::Serialize, what: &str) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(value).map_err(|e| DomainError::Storage(format!("encode {what}: {e}")))
}

async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    snapshot: &Snapshot,
    state: &serde_json::Value,
    dependencies: &serde_json::Value,
) -> Result<bool, DomainError> {
    let result = sqlx::query(
        "INSERT INTO snapshots \
         (aggregate_name, read_model, state, watermark_at, watermark_id, dependencies, taken_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (aggregate_name, read_model) DO NOTHING",
    )
    .bind(&snapshot.aggregate_name)
    .bind(&snapshot.read_model)
    .bind(state)
    .bind(snapshot.watermark.map(|w| w.occurred_at))
    .bind(snapshot.watermark.map(|w| w.event_id))
    .bind(dependencies)
    .bind(snapshot.taken_at)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;
    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn load(
        &self,
        aggregate_name: &str,
        read_model: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            "SELECT state, watermark_at, watermark_id, dependencies, taken_at \
             FROM snapshots WHERE aggregate_name = $1 AND read_model = $2",
        )
        .bind(aggregate_name)
        .bind(read_model)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.map(|row| decode(aggregate_name, read_model, row))
            .transpose()
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<SaveOutcome, DomainError> {
        let state = encode(&snapshot.state, "state")?;
        let dependencies = encode(&snapshot.dependencies, "dependencies")?;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        if insert(&mut tx, snapshot, &state, &dependencies).await? {
            tx.commit().await.map_err(storage)?;
            return Ok(SaveOutcome::Stored);
        }

        let stored: Option<PositionRow> = sqlx::query_as(
            "SELECT watermark_at, watermark_id, dependencies FROM snapshots \
             WHERE aggregate_name = $1 AND read_model = $2 FOR UPDATE",
        )
        .bind(&snapshot.aggregate_name)
        .bind(&snapshot.read_model)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let Some(stored) = stored else {
            let inserted = insert(&mut tx, snapshot, &state, &dependencies).await?;
            tx.commit().await.map_err(storage)?;
            return Ok(if inserted {
                SaveOutcome::Stored
            } else {
                SaveOutcome::Stale
            });
        };

        let position = watermark(stored.watermark_at, stored.watermark_id).and_then(|mark| {
            serde_json::from_value::<BTreeMap<String, Watermark>>(stored.dependencies)
                .map(|deps| (mark, deps))
                .map_err(|e| e.to_string())
        });
        match position {
            Ok((mark, deps)) => {
                let mut current =
                    Snapshot::empty(&snapshot.aggregate_name, &snapshot.read_model, snapshot.taken_at);
                current.watermark = mark;
                current.dependencies = deps;
                if !snapshot.is_ahead_of(&current) {
                    tx.rollback().await.map_err(storage)?;
                    debug!(
                        aggregate = %snapshot.aggregate_name,
                        read_model = %snapshot.read_model,
                        "refused stale snapshot"
                    );
                    return Ok(SaveOutcome::Stale);
                }
            }
            Err(reason) => warn!(
                aggregate = %snapshot.aggregate_name,
                read_model = %snapshot.read_model,
                %reason,
                "overwriting unreadable snapshot position"
            ),
        }

        sqlx::query(
            "UPDATE snapshots SET state = $3, watermark_at = $4, watermark_id = $5, \
             dependencies = $6, taken_at = $7 \
             WHERE aggregate_name = $1 AND read_model = $2",
        )
        .bind(&snapshot.aggregate_name)
        .bind(&snapshot.read_model)
        .bind(&state)
        .bind(snapshot.watermark.map(|w| w.occurred_at))
        .bind(snapshot.watermark.map(|w| w.event_id))
        .bind(&dependencies)
        .bind(snapshot.taken_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        Ok(SaveOutcome::Stored)
    }

    async fn delete(&self, aggregate_name: &str, read_model: &str) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM snapshots WHERE aggregate_name = $1 AND read_model = $2")
            .bind(aggregate_name)
            .bind(read_model)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}
