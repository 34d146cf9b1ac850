//! Event store database schema.
//!
//! The SQL lives in the workspace `migrations/` directory and is embedded
//! at compile time.

use exhorse_core::error::DomainError;
use sqlx::PgPool;
use sqlx::migrate::Migrator;

/// Migrations creating the `events` and `snapshots` tables.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Applies any pending migrations.
///
/// # Errors
///
/// Returns `DomainError::Storage` if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| DomainError::Storage(format!("migration failed: {e}")))
}
