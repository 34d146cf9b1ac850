//! Integration tests for `PgSnapshotStore`, and the rehydration engine
//! running on both Postgres backends.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use exhorse_core::clock::SystemClock;
use exhorse_core::entity::{Entity, ProjectionState};
use exhorse_core::error::DomainError;
use exhorse_core::event::Watermark;
use exhorse_core::repository::{SaveOutcome, Snapshot, SnapshotStore};
use exhorse_event_store::{PgEventLog, PgSnapshotStore};
use exhorse_store::{
    AggregateStore, FindQuery, ProjectionDefinition, ProjectionRegistry, Rehydrator,
    SnapshotPolicy,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

fn base_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn mark(at: DateTime<Utc>) -> Watermark {
    Watermark {
        occurred_at: at,
        event_id: Uuid::now_v7(),
    }
}

fn make_snapshot(watermark: Option<Watermark>) -> Snapshot {
    let t = base_time();
    let mut snapshot = Snapshot::empty("TODO", "DEFAULT", t);
    let mut fields = serde_json::Map::new();
    fields.insert("title".into(), json!("walk"));
    snapshot.state.insert(Entity::new(Uuid::now_v7(), t, fields));
    snapshot.watermark = watermark;
    snapshot
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_returns_none_when_absent(pool: PgPool) {
    let store = PgSnapshotStore::new(pool);

    let loaded = store.load("TODO", "DEFAULT").await.unwrap();

    assert!(loaded.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_save_and_load_round_trip(pool: PgPool) {
    let store = PgSnapshotStore::new(pool);
    let mut snapshot = make_snapshot(Some(mark(base_time())));
    snapshot
        .dependencies
        .insert("USER/DEFAULT".into(), mark(base_time()));

    let outcome = store.save(&snapshot).await.unwrap();

    assert_eq!(outcome, SaveOutcome::Stored);
    assert_eq!(store.load("TODO", "DEFAULT").await.unwrap(), Some(snapshot));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_save_refuses_older_or_equal_watermark(pool: PgPool) {
    // Arrange
    let store = PgSnapshotStore::new(pool);
    let t = base_time();
    let ahead = make_snapshot(Some(mark(t + Duration::seconds(10))));
    let behind = make_snapshot(Some(mark(t)));
    store.save(&ahead).await.unwrap();

    // Act
    let older = store.save(&behind).await.unwrap();
    let same = store.save(&ahead).await.unwrap();

    // Assert
    assert_eq!(older, SaveOutcome::Stale);
    assert_eq!(same, SaveOutcome::Stale);
    let stored = store.load("TODO", "DEFAULT").await.unwrap().unwrap();
    assert_eq!(stored.watermark, ahead.watermark);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_save_replaces_when_ahead(pool: PgPool) {
    let store = PgSnapshotStore::new(pool);
    let t = base_time();
    store.save(&make_snapshot(Some(mark(t)))).await.unwrap();
    let newer = make_snapshot(Some(mark(t + Duration::seconds(1))));

    let outcome = store.save(&newer).await.unwrap();

    assert_eq!(outcome, SaveOutcome::Stored);
    assert_eq!(store.load("TODO", "DEFAULT").await.unwrap(), Some(newer));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_corrupt_state_is_reported(pool: PgPool) {
    sqlx::query(
        "INSERT INTO snapshots (aggregate_name, read_model, state, dependencies, taken_at) \
         VALUES ('TODO', 'DEFAULT', '{\"not\": \"a list\"}', '{}', NOW())",
    )
    .execute(&pool)
    .await
    .unwrap();
    let store = PgSnapshotStore::new(pool);

    let result = store.load("TODO", "DEFAULT").await;

    match result {
        Err(DomainError::CorruptSnapshot(reason)) => assert!(reason.starts_with("TODO/DEFAULT")),
        other => panic!("expected CorruptSnapshot, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_delete_discards_snapshot(pool: PgPool) {
    let store = PgSnapshotStore::new(pool);
    store.save(&make_snapshot(None)).await.unwrap();

    store.delete("TODO", "DEFAULT").await.unwrap();

    assert!(store.load("TODO", "DEFAULT").await.unwrap().is_none());
    assert!(store.delete("TODO", "DEFAULT").await.is_ok());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_store_on_postgres_serves_snapshot_when_log_table_is_gone(pool: PgPool) {
    // Arrange
    let mut registry = ProjectionRegistry::new();
    registry
        .register(ProjectionDefinition::new("TODO", "DEFAULT"))
        .unwrap();
    let rehydrator = Arc::new(Rehydrator::new(
        Arc::new(PgEventLog::new(pool.clone())),
        Arc::new(PgSnapshotStore::new(pool.clone())),
        Arc::new(registry),
        Arc::new(SystemClock),
        SnapshotPolicy::EveryEvents(1),
    ));
    let todos = AggregateStore::new(rehydrator, "TODO").unwrap();
    let first = todos.create(Some("alice"), json!({"title": "A"})).await.unwrap();
    let second = todos.create(Some("alice"), json!({"title": "B"})).await.unwrap();
    todos.find(&FindQuery::default()).await.unwrap();

    // Act
    sqlx::query("DROP TABLE events").execute(&pool).await.unwrap();
    let live = todos.find(&FindQuery::default()).await;
    let cached = todos.find_cached(&FindQuery::default()).await.unwrap();

    // Assert
    assert!(matches!(live, Err(DomainError::Storage(_))));
    let ids: Vec<Uuid> = cached.data.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
    let state: ProjectionState = PgSnapshotStore::new(pool)
        .load("TODO", "DEFAULT")
        .await
        .unwrap()
        .unwrap()
        .state;
    assert_eq!(state.len(), 2);
}
