//! ex-horse API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use exhorse_api::error::AppError;
use exhorse_api::state::{AppState, projection_registry};
use exhorse_core::clock::SystemClock;
use exhorse_event_store::schema::run_migrations;
use exhorse_event_store::{PgEventLog, PgSnapshotStore};
use exhorse_store::{Rehydrator, StoreConfig};
use exhorse_users::domain::password::PasswordHasher;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting ex-horse API server");

    // Read configuration from environment.
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| AppError::Config("DATABASE_URL environment variable must be set".into()))?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?;
    let salt = std::env::var("PASSWORD_SALT").unwrap_or_default();
    if salt.is_empty() {
        tracing::warn!("PASSWORD_SALT is not set; password hashes use no pepper");
    }
    let config = StoreConfig::from_env().map_err(|e| AppError::Config(e.to_string()))?;
    tracing::info!(
        snapshot_policy = ?config.snapshot_policy,
        page_limit = config.page_limit,
        "store configured"
    );

    // Create database connection pool and bring the schema up to date.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    run_migrations(&pool).await?;

    // Build application state.
    let rehydrator = Arc::new(Rehydrator::new(
        Arc::new(PgEventLog::new(pool.clone())),
        Arc::new(PgSnapshotStore::new(pool)),
        Arc::new(projection_registry()?),
        Arc::new(SystemClock),
        config.snapshot_policy,
    ));
    let app_state = AppState::new(&rehydrator, PasswordHasher::new(salt), config.page_limit)?;

    // Build router.
    let app = exhorse_api::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
