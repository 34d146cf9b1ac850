//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use exhorse_core::repository::{EventLog, SnapshotStore};
use exhorse_event_store::{PgEventLog, PgSnapshotStore};
use exhorse_store::{Rehydrator, SnapshotPolicy};
use exhorse_test_support::{InMemoryEventLog, InMemorySnapshotStore, ManualClock};
use exhorse_users::domain::password::PasswordHasher;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

use exhorse_api::state::{AppState, projection_registry};

/// In-memory backends behind a test app, kept so tests can inspect or
/// break them.
pub struct TestBackends {
    pub events: Arc<InMemoryEventLog>,
    pub snapshots: Arc<InMemorySnapshotStore>,
}

fn build_app(events: Arc<dyn EventLog>, snapshots: Arc<dyn SnapshotStore>) -> Router {
    let rehydrator = Arc::new(Rehydrator::new(
        events,
        snapshots,
        Arc::new(projection_registry().unwrap()),
        Arc::new(ManualClock::default()),
        SnapshotPolicy::EveryEvents(1),
    ));
    let app_state = AppState::new(&rehydrator, PasswordHasher::new("test-salt"), 30).unwrap();
    exhorse_api::router().with_state(app_state)
}

/// Build the full app router over in-memory stores. Uses the same route
/// structure as `main.rs`.
pub fn build_test_app() -> (Router, TestBackends) {
    let backends = TestBackends {
        events: Arc::new(InMemoryEventLog::new()),
        snapshots: Arc::new(InMemorySnapshotStore::new()),
    };
    let app = build_app(backends.events.clone(), backends.snapshots.clone());
    (app, backends)
}

/// Build the full app router over PostgreSQL.
pub fn build_pg_app(pool: PgPool) -> Router {
    build_app(
        Arc::new(PgEventLog::new(pool.clone())),
        Arc::new(PgSnapshotStore::new(pool)),
    )
}

/// Send a request with an optional JSON body and return the status and the
/// decoded body (`Value::Null` when empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<&Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor", "tester");
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: &Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    send(app, "POST", uri, Some(body)).await
}

/// Send a GET request.
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, None).await
}

/// Sign up `username` and return the new user's ID.
pub async fn sign_up(app: &Router, username: &str) -> String {
    let (status, json) = post_json(
        app,
        "/api/users/sign-up",
        &serde_json::json!({"username": username, "password": "hunter2"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["userId"].as_str().unwrap().to_owned()
}
