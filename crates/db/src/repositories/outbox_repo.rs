//! Repository for the `outbox_messages` ledger.
//!
//! Status updates are conditional transitions: an UPDATE only applies while
//! the record is still non-terminal, so a late writer on the losing side of
//! a publish/redeliver race can never demote a `delivered` or `failed` row.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::outbox::{OutboxMessage, OutboxStatus};

const OUTBOX_COLUMNS: &str = "\
    id, event_type, payload, status, retry_count, error_message, \
    created_at, last_attempt_at, processed_at";

/// Provides the durable record-store operations for the outbox.
pub struct OutboxRepo;

impl OutboxRepo {
    /// Durably stage a new `pending` record, returning its id.
    ///
    /// This must succeed before any delivery attempt is made; a storage
    /// error here means the event was not accepted.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO outbox_messages (id, event_type, payload) \
             VALUES ($1, $2, $3) \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(event_type)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Select up to `limit` retriable records, oldest first.
    ///
    /// `in_flight` rows are included so that records orphaned by a crash
    /// mid-attempt are picked up again.
    pub async fn select_batch(
        pool: &PgPool,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<OutboxMessage>, sqlx::Error> {
        let query = format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox_messages \
             WHERE status IN ('pending', 'in_flight') AND retry_count < $2 \
             ORDER BY created_at ASC LIMIT $1"
        );
        sqlx::query_as::<_, OutboxMessage>(&query)
            .bind(limit)
            .bind(max_retries)
            .fetch_all(pool)
            .await
    }

    /// Claim a record for a background delivery attempt.
    ///
    /// Moves it to `in_flight`, consumes one unit of retry budget, and
    /// stamps `last_attempt_at`. Returns the new retry count, or `None` if
    /// the record reached a terminal state in the meantime.
    pub async fn begin_attempt(pool: &PgPool, id: Uuid) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE outbox_messages SET \
                 status = 'in_flight', \
                 retry_count = retry_count + 1, \
                 last_attempt_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'in_flight') \
             RETURNING retry_count",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Mark a record as delivered, setting `processed_at` once.
    ///
    /// Idempotent: a second call (or a call racing a terminal transition)
    /// matches no row and returns `false`.
    pub async fn mark_delivered(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE outbox_messages SET \
                 status = 'delivered', \
                 processed_at = NOW(), \
                 error_message = NULL \
             WHERE id = $1 AND status IN ('pending', 'in_flight')",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return a record to `pending` after a failed attempt, recording the
    /// failure detail.
    pub async fn mark_retry(
        pool: &PgPool,
        id: Uuid,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE outbox_messages SET \
                 status = 'pending', \
                 error_message = $2 \
             WHERE id = $1 AND status = 'in_flight'",
        )
        .bind(id)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Abandon a record permanently.
    ///
    /// Used when the retry budget is exhausted or the payload can no longer
    /// be decoded. Terminal: the redelivery loop never selects `failed`.
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE outbox_messages SET \
                 status = 'failed', \
                 error_message = $2 \
             WHERE id = $1 AND status IN ('pending', 'in_flight')",
        )
        .bind(id)
        .bind(error_message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a record by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<OutboxMessage>, sqlx::Error> {
        let query = format!("SELECT {OUTBOX_COLUMNS} FROM outbox_messages WHERE id = $1");
        sqlx::query_as::<_, OutboxMessage>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Per-status row counts, for the backlog gauge and operator queries.
    pub async fn counts_by_status(
        pool: &PgPool,
    ) -> Result<Vec<(OutboxStatus, i64)>, sqlx::Error> {
        sqlx::query_as("SELECT status, COUNT(*) FROM outbox_messages GROUP BY status")
            .fetch_all(pool)
            .await
    }
}
