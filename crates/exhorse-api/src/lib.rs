//! ex-horse API: HTTP surface over the USER and TODO aggregate stores.

pub mod error;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Every route served, before middleware and state are attached.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/users", routes::users::router())
        .nest("/api/todos", routes::todos::router())
}
