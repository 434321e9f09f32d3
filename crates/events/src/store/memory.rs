//! In-memory record store for tests and local development.
//!
//! Keeps the exact transition discipline of the Postgres store so the
//! pipeline can be exercised without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use relay_db::models::outbox::{OutboxMessage, OutboxStatus};

use super::{OutboxStore, StoreError};

/// HashMap-backed [`OutboxStore`]. Clone-friendly via `Arc`.
#[derive(Clone, Default)]
pub struct MemoryOutboxStore {
    records: Arc<Mutex<HashMap<Uuid, OutboxMessage>>>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, OutboxMessage>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn insert(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let message = OutboxMessage {
            id,
            event_type: event_type.to_string(),
            payload: payload.clone(),
            status: OutboxStatus::Pending,
            retry_count: 0,
            error_message: None,
            created_at: Utc::now(),
            last_attempt_at: None,
            processed_at: None,
        };
        self.lock()?.insert(id, message);
        Ok(id)
    }

    async fn select_batch(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<OutboxMessage>, StoreError> {
        let records = self.lock()?;
        let mut batch: Vec<OutboxMessage> = records
            .values()
            .filter(|m| {
                matches!(m.status, OutboxStatus::Pending | OutboxStatus::InFlight)
                    && m.retry_count < max_retries
            })
            .cloned()
            .collect();
        batch.sort_by_key(|m| m.created_at);
        batch.truncate(limit.max(0) as usize);
        Ok(batch)
    }

    async fn begin_attempt(&self, id: Uuid) -> Result<Option<i32>, StoreError> {
        let mut records = self.lock()?;
        match records.get_mut(&id) {
            Some(m) if matches!(m.status, OutboxStatus::Pending | OutboxStatus::InFlight) => {
                m.status = OutboxStatus::InFlight;
                m.retry_count += 1;
                m.last_attempt_at = Some(Utc::now());
                Ok(Some(m.retry_count))
            }
            _ => Ok(None),
        }
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.lock()?;
        match records.get_mut(&id) {
            Some(m) if matches!(m.status, OutboxStatus::Pending | OutboxStatus::InFlight) => {
                m.status = OutboxStatus::Delivered;
                m.processed_at = Some(Utc::now());
                m.error_message = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_retry(&self, id: Uuid, error_message: &str) -> Result<bool, StoreError> {
        let mut records = self.lock()?;
        match records.get_mut(&id) {
            Some(m) if m.status == OutboxStatus::InFlight => {
                m.status = OutboxStatus::Pending;
                m.error_message = Some(error_message.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<bool, StoreError> {
        let mut records = self.lock()?;
        match records.get_mut(&id) {
            Some(m) if matches!(m.status, OutboxStatus::Pending | OutboxStatus::InFlight) => {
                m.status = OutboxStatus::Failed;
                m.error_message = Some(error_message.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OutboxMessage>, StoreError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn counts_by_status(&self) -> Result<Vec<(OutboxStatus, i64)>, StoreError> {
        let records = self.lock()?;
        let mut counts: HashMap<OutboxStatus, i64> = HashMap::new();
        for m in records.values() {
            *counts.entry(m.status).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({"user_id": "42"})
    }

    #[tokio::test]
    async fn insert_creates_pending_record_with_zero_retries() {
        let store = MemoryOutboxStore::new();
        let id = store.insert("user.created", &payload()).await.unwrap();

        let record = store.find_by_id(id).await.unwrap().expect("record exists");
        assert_eq!(record.status, OutboxStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert!(record.processed_at.is_none());
    }

    #[tokio::test]
    async fn mark_delivered_is_idempotent() {
        let store = MemoryOutboxStore::new();
        let id = store.insert("user.created", &payload()).await.unwrap();

        assert!(store.mark_delivered(id).await.unwrap());
        let first = store.find_by_id(id).await.unwrap().unwrap().processed_at;

        assert!(!store.mark_delivered(id).await.unwrap());
        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.status, OutboxStatus::Delivered);
        assert_eq!(record.processed_at, first);
    }

    #[tokio::test]
    async fn late_retry_cannot_demote_a_delivered_record() {
        let store = MemoryOutboxStore::new();
        let id = store.insert("user.created", &payload()).await.unwrap();

        store.begin_attempt(id).await.unwrap();
        store.mark_delivered(id).await.unwrap();

        assert!(!store.mark_retry(id, "late failure").await.unwrap());
        assert!(!store.mark_failed(id, "late failure").await.unwrap());
        let record = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.status, OutboxStatus::Delivered);
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn begin_attempt_consumes_budget_and_returns_none_when_terminal() {
        let store = MemoryOutboxStore::new();
        let id = store.insert("user.created", &payload()).await.unwrap();

        assert_eq!(store.begin_attempt(id).await.unwrap(), Some(1));
        assert_eq!(store.begin_attempt(id).await.unwrap(), Some(2));

        store.mark_failed(id, "done").await.unwrap();
        assert_eq!(store.begin_attempt(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn select_batch_returns_oldest_first_and_respects_budget() {
        let store = MemoryOutboxStore::new();
        let first = store.insert("user.created", &payload()).await.unwrap();
        let second = store.insert("user.updated", &payload()).await.unwrap();

        let batch = store.select_batch(10, 5).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, first);
        assert_eq!(batch[1].id, second);

        // Exhaust the first record's budget; it drops out of selection.
        for _ in 0..5 {
            store.begin_attempt(first).await.unwrap();
            store.mark_retry(first, "boom").await.unwrap();
        }
        let batch = store.select_batch(10, 5).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, second);
    }

    #[tokio::test]
    async fn in_flight_records_remain_selectable() {
        let store = MemoryOutboxStore::new();
        let id = store.insert("user.created", &payload()).await.unwrap();
        store.begin_attempt(id).await.unwrap();

        // Simulates a crash mid-attempt: the record stays in_flight and is
        // still picked up by the next cycle.
        let batch = store.select_batch(10, 5).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].status, OutboxStatus::InFlight);
    }
}
