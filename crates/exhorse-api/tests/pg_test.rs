//! End-to-end tests against PostgreSQL.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn test_sign_up_and_create_todo_round_trip(pool: PgPool) {
    let app = common::build_pg_app(pool.clone());
    let author_id = common::sign_up(&app, "bob").await;

    let (status, created) = common::post_json(
        &app,
        "/api/todos",
        &json!({"authorId": author_id, "title": "A"}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);

    // A fresh app over the same pool starts from the persisted snapshot.
    let app = common::build_pg_app(pool);
    let todo_id = created["todoId"].as_str().unwrap();
    let (status, json) = common::get_json(&app, &format!("/api/todos/{todo_id}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["author"]["username"], "bob");
}
