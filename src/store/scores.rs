//! `PerformanceScores` persistence and the scoring-configuration
//! weight resolution priority chain:
//! session snapshot > patient preference > trial default > system default.

use super::StoreError;
use crate::scoring::rpe::default_rpe_mapping;
use crate::types::{ComplianceSubWeights, PerformanceScores, Rate01, Score0100, ScoringConfiguration, ScoringWeights};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct ScoresRepository {
    pool: PgPool,
}

impl ScoresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, scores: &PerformanceScores) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO performance_scores \
                (session_id, overall, compliance, symmetry, effort, game, \
                 left_muscle_compliance, right_muscle_compliance, \
                 completion_rate_left, intensity_rate_left, duration_rate_left, \
                 completion_rate_right, intensity_rate_right, duration_rate_right, \
                 bfr_compliant, rpe_post_session, scoring_config_id) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17) \
             ON CONFLICT (session_id) DO UPDATE SET \
                overall = EXCLUDED.overall, compliance = EXCLUDED.compliance, \
                symmetry = EXCLUDED.symmetry, effort = EXCLUDED.effort, game = EXCLUDED.game, \
                left_muscle_compliance = EXCLUDED.left_muscle_compliance, \
                right_muscle_compliance = EXCLUDED.right_muscle_compliance, \
                completion_rate_left = EXCLUDED.completion_rate_left, \
                intensity_rate_left = EXCLUDED.intensity_rate_left, \
                duration_rate_left = EXCLUDED.duration_rate_left, \
                completion_rate_right = EXCLUDED.completion_rate_right, \
                intensity_rate_right = EXCLUDED.intensity_rate_right, \
                duration_rate_right = EXCLUDED.duration_rate_right, \
                bfr_compliant = EXCLUDED.bfr_compliant, \
                rpe_post_session = EXCLUDED.rpe_post_session",
        )
        .bind(scores.session_id)
        .bind(scores.overall.map(|s| s.get()))
        .bind(scores.compliance.map(|s| s.get()))
        .bind(scores.symmetry.map(|s| s.get()))
        .bind(scores.effort.map(|s| s.get()))
        .bind(scores.game.map(|s| s.get()))
        .bind(scores.left_muscle_compliance.map(|s| s.get()))
        .bind(scores.right_muscle_compliance.map(|s| s.get()))
        .bind(scores.completion_rate_left.get())
        .bind(scores.intensity_rate_left.get())
        .bind(scores.duration_rate_left.get())
        .bind(scores.completion_rate_right.get())
        .bind(scores.intensity_rate_right.get())
        .bind(scores.duration_rate_right.get())
        .bind(scores.bfr_compliant)
        .bind(scores.rpe_post_session.map(|v| v as i16))
        .bind(scores.scoring_config_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the persisted scores for a session, the read side of
    /// [`Self::save`] — backs the subjective-update phase, which needs
    /// the compliance/symmetry already computed by the first pass.
    pub async fn load_by_session(&self, session_id: Uuid) -> Result<Option<PerformanceScores>, StoreError> {
        let row: Option<PerformanceScoresRow> = sqlx::query_as(
            "SELECT session_id, overall, compliance, symmetry, effort, game, \
                    left_muscle_compliance, right_muscle_compliance, \
                    completion_rate_left, intensity_rate_left, duration_rate_left, \
                    completion_rate_right, intensity_rate_right, duration_rate_right, \
                    bfr_compliant, rpe_post_session, scoring_config_id \
             FROM performance_scores WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PerformanceScoresRow::into_domain))
    }

    /// System defaults seeded from configuration constants — the last
    /// link in the resolution chain, used when no row exists anywhere
    /// in `scoring_configurations`.
    fn system_default(&self) -> ScoringConfiguration {
        ScoringConfiguration {
            id: Uuid::nil(),
            name: "system_default".to_string(),
            weights: ScoringWeights {
                compliance: 0.50,
                symmetry: 0.25,
                effort: 0.25,
                game: 0.0,
            },
            sub_weights: ComplianceSubWeights {
                completion: 0.333,
                intensity: 0.333,
                duration: 0.334,
            },
            rpe_mapping: default_rpe_mapping(),
            active: true,
        }
    }

    /// Resolve which configuration snapshot applies to a session,
    /// following the four-step priority chain. `existing_snapshot_id`
    /// is `Some` only once a session has already been scored once —
    /// that snapshot is then immutable for the session's lifetime.
    pub async fn resolve_scoring_configuration(
        &self,
        existing_snapshot_id: Option<Uuid>,
        patient_id: Option<&str>,
    ) -> Result<ScoringConfiguration, StoreError> {
        if let Some(id) = existing_snapshot_id {
            if let Some(cfg) = self.load_by_id(id).await? {
                return Ok(cfg);
            }
        }

        if let Some(patient_id) = patient_id {
            if let Some(cfg) = self.load_patient_preferred(patient_id).await? {
                return Ok(cfg);
            }
        }

        if let Some(cfg) = self.load_trial_default().await? {
            return Ok(cfg);
        }

        Ok(self.system_default())
    }

    async fn load_by_id(&self, id: Uuid) -> Result<Option<ScoringConfiguration>, StoreError> {
        let row: Option<ScoringConfigRow> =
            sqlx::query_as("SELECT id, name, weights, sub_weights, rpe_mapping, active FROM scoring_configurations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(ScoringConfigRow::into_domain))
    }

    async fn load_patient_preferred(&self, patient_id: &str) -> Result<Option<ScoringConfiguration>, StoreError> {
        let row: Option<ScoringConfigRow> = sqlx::query_as(
            "SELECT sc.id, sc.name, sc.weights, sc.sub_weights, sc.rpe_mapping, sc.active \
             FROM scoring_configurations sc \
             JOIN patient_preferred_configs ppc ON ppc.scoring_config_id = sc.id \
             WHERE ppc.patient_id = $1",
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ScoringConfigRow::into_domain))
    }

    async fn load_trial_default(&self) -> Result<Option<ScoringConfiguration>, StoreError> {
        let row: Option<ScoringConfigRow> = sqlx::query_as(
            "SELECT id, name, weights, sub_weights, rpe_mapping, active \
             FROM scoring_configurations WHERE active = true ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ScoringConfigRow::into_domain))
    }
}

#[derive(sqlx::FromRow)]
struct PerformanceScoresRow {
    session_id: Uuid,
    overall: Option<f64>,
    compliance: Option<f64>,
    symmetry: Option<f64>,
    effort: Option<f64>,
    game: Option<f64>,
    left_muscle_compliance: Option<f64>,
    right_muscle_compliance: Option<f64>,
    completion_rate_left: f64,
    intensity_rate_left: f64,
    duration_rate_left: f64,
    completion_rate_right: f64,
    intensity_rate_right: f64,
    duration_rate_right: f64,
    bfr_compliant: bool,
    rpe_post_session: Option<i16>,
    scoring_config_id: Uuid,
}

impl PerformanceScoresRow {
    fn into_domain(self) -> PerformanceScores {
        PerformanceScores {
            session_id: self.session_id,
            overall: self.overall.map(Score0100::new),
            compliance: self.compliance.map(Score0100::new),
            symmetry: self.symmetry.map(Score0100::new),
            effort: self.effort.map(Score0100::new),
            game: self.game.map(Score0100::new),
            left_muscle_compliance: self.left_muscle_compliance.map(Score0100::new),
            right_muscle_compliance: self.right_muscle_compliance.map(Score0100::new),
            completion_rate_left: Rate01::new(self.completion_rate_left),
            intensity_rate_left: Rate01::new(self.intensity_rate_left),
            duration_rate_left: Rate01::new(self.duration_rate_left),
            completion_rate_right: Rate01::new(self.completion_rate_right),
            intensity_rate_right: Rate01::new(self.intensity_rate_right),
            duration_rate_right: Rate01::new(self.duration_rate_right),
            bfr_compliant: self.bfr_compliant,
            rpe_post_session: self.rpe_post_session.map(|v| v as u8),
            scoring_config_id: self.scoring_config_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScoringConfigRow {
    id: Uuid,
    name: String,
    weights: serde_json::Value,
    sub_weights: serde_json::Value,
    rpe_mapping: serde_json::Value,
    active: bool,
}

impl ScoringConfigRow {
    fn into_domain(self) -> ScoringConfiguration {
        ScoringConfiguration {
            id: self.id,
            name: self.name,
            weights: serde_json::from_value(self.weights).unwrap_or(ScoringWeights {
                compliance: 0.50,
                symmetry: 0.25,
                effort: 0.25,
                game: 0.0,
            }),
            sub_weights: serde_json::from_value(self.sub_weights).unwrap_or(ComplianceSubWeights {
                completion: 0.333,
                intensity: 0.333,
                duration: 0.334,
            }),
            rpe_mapping: serde_json::from_value(self.rpe_mapping).unwrap_or_else(default_rpe_mapping),
            active: self.active,
        }
    }
}
