//! The durable record store behind the publisher and the redelivery loop.
//!
//! [`OutboxStore`] is the narrow seam both execution paths share. The
//! Postgres implementation is the production store; the in-memory one backs
//! the pipeline tests and mirrors the same conditional-transition semantics.

use async_trait::async_trait;
use uuid::Uuid;

use relay_db::models::outbox::{OutboxMessage, OutboxStatus};

mod memory;
mod postgres;

pub use memory::MemoryOutboxStore;
pub use postgres::PgOutboxStore;

/// Error type for record-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database rejected the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// In-memory storage failure (poisoned lock).
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable, queryable ledger of pending/delivered/failed event records.
///
/// Every mutation is a conditional transition: updates apply only while the
/// record is still in an eligible state, so racing writers settle on the
/// first terminal outcome instead of corrupting it.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Durably stage a new `Pending` record with a zero retry count.
    ///
    /// A failure here is a hard error: the event was not accepted.
    async fn insert(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Uuid, StoreError>;

    /// Up to `limit` records with `status ∈ {Pending, InFlight}` and
    /// `retry_count < max_retries`, oldest first.
    async fn select_batch(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<OutboxMessage>, StoreError>;

    /// Claim a record for a delivery attempt: `Pending|InFlight → InFlight`,
    /// `retry_count += 1`, `last_attempt_at` stamped. Returns the new retry
    /// count, or `None` if the record is already terminal.
    async fn begin_attempt(&self, id: Uuid) -> Result<Option<i32>, StoreError>;

    /// `Pending|InFlight → Delivered`, setting `processed_at` once and
    /// clearing the error message. Idempotent.
    async fn mark_delivered(&self, id: Uuid) -> Result<bool, StoreError>;

    /// `InFlight → Pending` after a failed attempt, recording the failure.
    async fn mark_retry(&self, id: Uuid, error_message: &str) -> Result<bool, StoreError>;

    /// `Pending|InFlight → Failed`. Terminal.
    async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<bool, StoreError>;

    /// Fetch a single record.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxMessage>, StoreError>;

    /// Per-status record counts for the backlog gauge.
    async fn counts_by_status(&self) -> Result<Vec<(OutboxStatus, i64)>, StoreError>;
}
