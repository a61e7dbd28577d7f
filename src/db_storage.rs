//! Reservation history source and follow-up sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{
    FollowUpRow, FollowUpStatus, GeneratedFollowUp, ReservationRecord, ReservationRow, StrategyId,
};

/// Read access to the booking site's reservation table.
#[async_trait]
pub trait ReservationSource: Send + Sync {
    /// History of one client, most recent first.
    async fn history_for_client(&self, email: &str) -> Result<Vec<ReservationRecord>, AppError>;

    /// History of every client, most recent first.
    async fn all_history(&self) -> Result<Vec<ReservationRecord>, AppError>;
}

/// Persistence for generated follow-ups.
#[async_trait]
pub trait FollowUpStore: Send + Sync {
    async fn insert(&self, follow_up: &GeneratedFollowUp) -> Result<(), AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<GeneratedFollowUp>, AppError>;

    /// Moves a follow-up from `from` to `to` in one atomic step.
    ///
    /// Returns `false` when the row is missing or no longer in `from`, so two
    /// callers can never both win the same transition.
    async fn transition_status(
        &self,
        id: Uuid,
        from: FollowUpStatus,
        to: FollowUpStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError>;

    /// Pending follow-ups whose `scheduled_at` is not after `now`, oldest first.
    async fn due_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<GeneratedFollowUp>, AppError>;

    /// When this strategy was last generated for the client, if ever.
    async fn last_generated_at(
        &self,
        email: &str,
        strategy: StrategyId,
    ) -> Result<Option<DateTime<Utc>>, AppError>;

    async fn generated_since(&self, since: DateTime<Utc>)
        -> Result<Vec<GeneratedFollowUp>, AppError>;
}

const RESERVATION_COLUMNS: &str = r#"
    email, created_at, amount, status, space_type, activity, payment_method, phone, full_name
"#;

const FOLLOW_UP_COLUMNS: &str = r#"
    id, client_email, strategy_id, subject, message, channel, scheduled_at,
    priority, confidence, generated_at, status, sent_at
"#;

/// Postgres-backed implementation of both storage traits.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn rows_to_follow_ups(rows: Vec<FollowUpRow>) -> Result<Vec<GeneratedFollowUp>, AppError> {
    rows.into_iter().map(GeneratedFollowUp::try_from).collect()
}

#[async_trait]
impl ReservationSource for PgStorage {
    async fn history_for_client(&self, email: &str) -> Result<Vec<ReservationRecord>, AppError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE lower(email) = lower($1) ORDER BY created_at DESC",
            RESERVATION_COLUMNS
        ))
        .bind(email.trim())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load reservation history for {}", email))?;

        Ok(rows.into_iter().map(ReservationRecord::from).collect())
    }

    async fn all_history(&self) -> Result<Vec<ReservationRecord>, AppError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE email IS NOT NULL ORDER BY created_at DESC",
            RESERVATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load reservation history")?;

        tracing::debug!("Loaded {} reservation rows", rows.len());
        Ok(rows.into_iter().map(ReservationRecord::from).collect())
    }
}

#[async_trait]
impl FollowUpStore for PgStorage {
    async fn insert(&self, f: &GeneratedFollowUp) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO ai_follow_ups (
                id, client_email, strategy_id, subject, message, channel, scheduled_at,
                priority, confidence, generated_at, status, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(f.id)
        .bind(&f.client_email)
        .bind(f.strategy_id.as_str())
        .bind(&f.subject)
        .bind(&f.message)
        .bind(f.channel.as_str())
        .bind(f.scheduled_at)
        .bind(f.priority.as_str())
        .bind(f.confidence as i16)
        .bind(f.generated_at)
        .bind(f.status.as_str())
        .bind(f.sent_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert follow-up {}", f.id))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<GeneratedFollowUp>, AppError> {
        let row = sqlx::query_as::<_, FollowUpRow>(&format!(
            "SELECT {} FROM ai_follow_ups WHERE id = $1",
            FOLLOW_UP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load follow-up {}", id))?;

        row.map(GeneratedFollowUp::try_from).transpose()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: FollowUpStatus,
        to: FollowUpStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE ai_follow_ups
            SET status = $3, sent_at = COALESCE($4, sent_at)
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update follow-up {}", id))?;

        Ok(result.rows_affected() == 1)
    }

    async fn due_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<GeneratedFollowUp>, AppError> {
        let rows = sqlx::query_as::<_, FollowUpRow>(&format!(
            "SELECT {} FROM ai_follow_ups
             WHERE status = 'pending' AND scheduled_at <= $1
             ORDER BY scheduled_at ASC
             LIMIT $2",
            FOLLOW_UP_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load due follow-ups")?;

        rows_to_follow_ups(rows)
    }

    async fn last_generated_at(
        &self,
        email: &str,
        strategy: StrategyId,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let last = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(generated_at) FROM ai_follow_ups WHERE client_email = $1 AND strategy_id = $2",
        )
        .bind(email)
        .bind(strategy.as_str())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to check cooldown for {}", email))?;

        Ok(last)
    }

    async fn generated_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<GeneratedFollowUp>, AppError> {
        let rows = sqlx::query_as::<_, FollowUpRow>(&format!(
            "SELECT {} FROM ai_follow_ups WHERE generated_at >= $1 ORDER BY generated_at DESC",
            FOLLOW_UP_COLUMNS
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load follow-up statistics")?;

        rows_to_follow_ups(rows)
    }
}
