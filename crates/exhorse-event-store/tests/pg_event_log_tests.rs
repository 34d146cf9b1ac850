//! Integration tests for `PgEventLog`.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use exhorse_core::event::{EventKind, StoredEvent};
use exhorse_core::repository::{EventFilter, EventLog};
use exhorse_event_store::pg_event_log::PgEventLog;
use sqlx::PgPool;
use uuid::Uuid;

fn base_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Helper to build a `StoredEvent` with sensible defaults.
fn make_event(
    aggregate_name: &str,
    kind: EventKind,
    aggregate_id: Option<Uuid>,
    occurred_at: DateTime<Utc>,
) -> StoredEvent {
    StoredEvent {
        event_id: Uuid::now_v7(),
        aggregate_name: aggregate_name.to_string(),
        aggregate_id,
        read_model: None,
        kind,
        payload: serde_json::json!({"key": "value"}),
        actor: Some("tester".to_string()),
        occurred_at,
    }
}

// --- append + fetch round-trip ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_fetch_returns_empty_vec_for_unknown_stream(pool: PgPool) {
    let log = PgEventLog::new(pool);

    let events = log.fetch(&EventFilter::stream("NOBODY")).await.unwrap();

    assert!(events.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_and_fetch_single_event(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let event = make_event("TODO", EventKind::Create, Some(Uuid::now_v7()), base_time());
    let expected = event.clone();

    let id = log.append(event).await.unwrap();

    let loaded = log.fetch(&EventFilter::stream("TODO")).await.unwrap();
    assert_eq!(id, expected.event_id);
    assert_eq!(loaded, vec![expected]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_custom_kind_and_missing_fields_round_trip(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let mut event = make_event("USER", EventKind::Custom("LOGIN".into()), None, base_time());
    event.actor = None;
    let expected = event.clone();

    log.append(event).await.unwrap();

    let loaded = log.fetch(&EventFilter::stream("USER")).await.unwrap();
    assert_eq!(loaded, vec![expected]);
}

// --- ordering ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_fetch_orders_by_time_then_id(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let t = base_time();
    let late = make_event("TODO", EventKind::Create, Some(Uuid::now_v7()), t + Duration::seconds(5));
    let tie_a = make_event("TODO", EventKind::Create, Some(Uuid::now_v7()), t);
    let tie_b = make_event("TODO", EventKind::Create, Some(Uuid::now_v7()), t);
    let expected = vec![tie_a.event_id, tie_b.event_id, late.event_id];

    for event in [late, tie_b, tie_a] {
        log.append(event).await.unwrap();
    }

    let ids: Vec<Uuid> = log
        .fetch(&EventFilter::stream("TODO"))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_id)
        .collect();
    assert_eq!(ids, expected);
}

// --- filters ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_fetch_after_and_until_bounds(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let t = base_time();
    let events: Vec<StoredEvent> = (0..4)
        .map(|i| make_event("TODO", EventKind::Create, Some(Uuid::now_v7()), t + Duration::seconds(i)))
        .collect();
    for event in &events {
        log.append(event.clone()).await.unwrap();
    }

    let filter = EventFilter::stream("TODO")
        .after(Some(events[0].watermark()))
        .until(Some(events[2].watermark()));
    let loaded = log.fetch(&filter).await.unwrap();

    assert_eq!(loaded, events[1..=2].to_vec());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_fetch_read_model_keeps_untagged_events(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let t = base_time();
    let untagged = make_event("TODO", EventKind::Create, Some(Uuid::now_v7()), t);
    let mut mine = make_event("TODO", EventKind::Custom("STAR".into()), None, t + Duration::seconds(1));
    mine.read_model = Some("STARRED".into());
    let mut other = make_event("TODO", EventKind::Custom("STAR".into()), None, t + Duration::seconds(2));
    other.read_model = Some("ARCHIVE".into());
    for event in [untagged.clone(), mine.clone(), other] {
        log.append(event).await.unwrap();
    }

    let loaded = log
        .fetch(&EventFilter::stream("TODO").for_read_model("STARRED"))
        .await
        .unwrap();

    assert_eq!(loaded, vec![untagged, mine]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_fetch_known_ids_plus_creations(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let t = base_time();
    let known = Uuid::now_v7();
    let stranger = Uuid::now_v7();
    let patch_known = make_event("TODO", EventKind::Patch, Some(known), t);
    let create_stranger = make_event("TODO", EventKind::Create, Some(stranger), t + Duration::seconds(1));
    let patch_stranger = make_event("TODO", EventKind::Patch, Some(stranger), t + Duration::seconds(2));
    for event in [patch_known.clone(), create_stranger.clone(), patch_stranger] {
        log.append(event).await.unwrap();
    }

    let loaded = log
        .fetch(&EventFilter::stream("TODO").for_ids(vec![known], true))
        .await
        .unwrap();

    assert_eq!(loaded, vec![patch_known, create_stranger]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_history_returns_one_entity_only(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let t = base_time();
    let id = Uuid::now_v7();
    let create = make_event("TODO", EventKind::Create, Some(id), t);
    let patch = make_event("TODO", EventKind::Patch, Some(id), t + Duration::seconds(1));
    let noise = make_event("TODO", EventKind::Create, Some(Uuid::now_v7()), t);
    for event in [create.clone(), noise, patch.clone()] {
        log.append(event).await.unwrap();
    }

    let history = log.history("TODO", id).await.unwrap();

    assert_eq!(history, vec![create, patch]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_event_id_is_a_storage_error(pool: PgPool) {
    let log = PgEventLog::new(pool);
    let event = make_event("TODO", EventKind::Create, Some(Uuid::now_v7()), base_time());

    log.append(event.clone()).await.unwrap();
    let result = log.append(event).await;

    match result {
        Err(exhorse_core::error::DomainError::Storage(_)) => {}
        other => panic!("expected Storage, got {other:?}"),
    }
}
