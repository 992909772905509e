//! C8 — Artifact Store.
//!
//! Relational persistence façade over PostgreSQL. The orchestrator is
//! the only caller — every other component is a pure producer of data
//! that never touches the database.

mod channels;
mod scores;
mod sessions;

pub use channels::ChannelsRepository;
pub use scores::ScoresRepository;
pub use sessions::SessionsRepository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("session {session_id} not found")]
    SessionNotFound { session_id: uuid::Uuid },
    #[error("no scoring configuration is active")]
    NoActiveScoringConfiguration,
}

/// Postgres error code 23505 — `unique_violation`. Centralized here so
/// every repository racing an insert against a unique index (content
/// hash, idempotency keys) checks it the same way.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|e| e.code().as_deref() == Some("23505"))
}

/// Create a PostgreSQL connection pool with production sizing and
/// timeout defaults.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("connected to PostgreSQL");
    Ok(pool)
}

/// Run migrations from the `migrations/` directory at the crate root.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    info!("running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("migrations complete");
    Ok(())
}

/// Facade combining the three repositories behind one handle, the
/// shape the orchestrator actually depends on.
#[derive(Clone)]
pub struct ArtifactStore {
    pub sessions: SessionsRepository,
    pub channels: ChannelsRepository,
    pub scores: ScoresRepository,
}

impl ArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            sessions: SessionsRepository::new(pool.clone()),
            channels: ChannelsRepository::new(pool.clone()),
            scores: ScoresRepository::new(pool),
        }
    }
}
