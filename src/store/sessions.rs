//! Session row persistence: content-hash lookup, atomic per-patient
//! sequence allocation, and status transitions.

use super::StoreError;
use crate::types::{Session, SessionError, SessionStatus};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionsRepository {
    pool: PgPool,
}

impl SessionsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Session-by-hash lookup backing `CreateSession`'s idempotency —
    /// the unique index on `content_hash` makes this O(log n).
    pub async fn find_by_hash(&self, content_hash: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, content_hash, file_ref, session_code, patient_id, therapist_id, status, \
                    scoring_config_id, game_metadata, session_date, processing_error, \
                    created_at, updated_at \
             FROM sessions WHERE content_hash = $1",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionRow::into_domain))
    }

    /// Atomically allocate the next per-patient session ordinal via an
    /// UPSERT-and-increment on a counters table, doing the whole
    /// read-modify-write as one statement rather than a separate
    /// SELECT + UPDATE.
    pub async fn next_session_ordinal(&self, patient_id: &str) -> Result<u32, StoreError> {
        let (ordinal,): (i32,) = sqlx::query_as(
            "INSERT INTO patient_session_counters (patient_id, next_ordinal) \
             VALUES ($1, 2) \
             ON CONFLICT (patient_id) \
             DO UPDATE SET next_ordinal = patient_session_counters.next_ordinal + 1 \
             RETURNING next_ordinal - 1",
        )
        .bind(patient_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ordinal as u32)
    }

    pub async fn insert_pending(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions \
                (id, content_hash, file_ref, session_code, patient_id, therapist_id, status, \
                 scoring_config_id, game_metadata, session_date, processing_error, \
                 created_at, updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(session.id)
        .bind(&session.content_hash)
        .bind(&session.file_ref)
        .bind(&session.session_code)
        .bind(&session.patient_id)
        .bind(&session.therapist_id)
        .bind(session_status_str(session.status))
        .bind(session.scoring_config_id)
        .bind(&session.game_metadata)
        .bind(session.session_date)
        .bind(serde_json::to_value(&session.processing_error).ok())
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Session, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, content_hash, file_ref, session_code, patient_id, therapist_id, status, \
                    scoring_config_id, game_metadata, session_date, processing_error, \
                    created_at, updated_at \
             FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::SessionNotFound { session_id: id })?;

        Ok(row.into_domain())
    }

    /// Status transition is the only mutation allowed once a session
    /// leaves `pending` — `scoring_config_id` is never rewritten here
    /// once set, enforcing the immutability guarantee by omission.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        processing_error: Option<&SessionError>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sessions SET status = $2, processing_error = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(session_status_str(status))
        .bind(processing_error.and_then(|e| serde_json::to_value(e).ok()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_scoring_config_id(&self, id: Uuid, scoring_config_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sessions SET scoring_config_id = $2, updated_at = NOW() \
             WHERE id = $1 AND scoring_config_id IS NULL",
        )
        .bind(id)
        .bind(scoring_config_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_game_metadata_and_date(
        &self,
        id: Uuid,
        game_metadata: serde_json::Value,
        session_date: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sessions SET game_metadata = $2, session_date = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(game_metadata)
        .bind(session_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn session_status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "pending",
        SessionStatus::Processing => "processing",
        SessionStatus::Completed => "completed",
        SessionStatus::Failed => "failed",
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    content_hash: String,
    file_ref: String,
    session_code: String,
    patient_id: Option<String>,
    therapist_id: Option<String>,
    status: String,
    scoring_config_id: Option<Uuid>,
    game_metadata: serde_json::Value,
    session_date: Option<chrono::DateTime<chrono::Utc>>,
    processing_error: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl SessionRow {
    fn into_domain(self) -> Session {
        Session {
            id: self.id,
            content_hash: self.content_hash,
            file_ref: self.file_ref,
            session_code: self.session_code,
            patient_id: self.patient_id,
            therapist_id: self.therapist_id,
            status: match self.status.as_str() {
                "processing" => SessionStatus::Processing,
                "completed" => SessionStatus::Completed,
                "failed" => SessionStatus::Failed,
                _ => SessionStatus::Pending,
            },
            scoring_config_id: self.scoring_config_id,
            game_metadata: self.game_metadata,
            session_date: self.session_date,
            processing_error: self
                .processing_error
                .and_then(|v| serde_json::from_value(v).ok()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
