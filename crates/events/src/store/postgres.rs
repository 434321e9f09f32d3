//! Postgres-backed record store.

use async_trait::async_trait;
use uuid::Uuid;

use relay_db::models::outbox::{OutboxMessage, OutboxStatus};
use relay_db::repositories::OutboxRepo;
use relay_db::DbPool;

use super::{OutboxStore, StoreError};

/// Production [`OutboxStore`] delegating to [`OutboxRepo`].
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: DbPool,
}

impl PgOutboxStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn insert(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Uuid, StoreError> {
        Ok(OutboxRepo::insert(&self.pool, event_type, payload).await?)
    }

    async fn select_batch(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        Ok(OutboxRepo::select_batch(&self.pool, limit, max_retries).await?)
    }

    async fn begin_attempt(&self, id: Uuid) -> Result<Option<i32>, StoreError> {
        Ok(OutboxRepo::begin_attempt(&self.pool, id).await?)
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(OutboxRepo::mark_delivered(&self.pool, id).await?)
    }

    async fn mark_retry(&self, id: Uuid, error_message: &str) -> Result<bool, StoreError> {
        Ok(OutboxRepo::mark_retry(&self.pool, id, error_message).await?)
    }

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<bool, StoreError> {
        Ok(OutboxRepo::mark_failed(&self.pool, id, error_message).await?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxMessage>, StoreError> {
        Ok(OutboxRepo::find_by_id(&self.pool, id).await?)
    }

    async fn counts_by_status(&self) -> Result<Vec<(OutboxStatus, i64)>, StoreError> {
        Ok(OutboxRepo::counts_by_status(&self.pool).await?)
    }
}
