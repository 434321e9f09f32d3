//! Outbox record entity model.

use std::time::Duration;

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use relay_core::types::Timestamp;

/// Lifecycle state of an outbox record.
///
/// `Delivered` and `Failed` are terminal; a record never leaves them.
/// `InFlight` is held only for the duration of a delivery attempt, but a
/// crash mid-attempt can leave it behind indefinitely, so selection treats
/// `InFlight` the same as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, sqlx::Type)]
#[sqlx(type_name = "outbox_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    InFlight,
    Delivered,
    Failed,
}

impl OutboxStatus {
    /// Metric-label form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::InFlight => "in_flight",
            OutboxStatus::Delivered => "delivered",
            OutboxStatus::Failed => "failed",
        }
    }
}

/// A row from the `outbox_messages` table.
///
/// The payload is immutable once written; only `status`, `retry_count`,
/// `error_message`, and the attempt timestamps mutate, and only through the
/// conditional transitions in the repository.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub last_attempt_at: Option<Timestamp>,
    pub processed_at: Option<Timestamp>,
}

impl OutboxMessage {
    /// Delay this record must wait before its next background attempt:
    /// `base * 2^(retry_count - 1)`, zero before the first attempt.
    pub fn backoff_delay(&self, base: Duration) -> Duration {
        if self.retry_count <= 0 {
            return Duration::ZERO;
        }
        base.saturating_mul(2u32.saturating_pow(self.retry_count as u32 - 1))
    }

    /// Whether enough time has elapsed since the previous attempt (or
    /// creation, if none was made) for the record to be retried at `now`.
    pub fn is_due(&self, now: Timestamp, base: Duration) -> bool {
        let delay = self.backoff_delay(base);
        if delay.is_zero() {
            return true;
        }
        let reference = self.last_attempt_at.unwrap_or(self.created_at);
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(reference) >= delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(retry_count: i32) -> OutboxMessage {
        OutboxMessage {
            id: Uuid::new_v4(),
            event_type: "user.created".into(),
            payload: serde_json::json!({}),
            status: OutboxStatus::Pending,
            retry_count,
            error_message: None,
            created_at: Utc::now(),
            last_attempt_at: None,
            processed_at: None,
        }
    }

    /// The documented schedule for a 5 s base: 5, 10, 20, 40, 80 seconds.
    #[test]
    fn backoff_schedule_doubles_per_retry() {
        let base = Duration::from_secs(5);
        let expected = [5u64, 10, 20, 40, 80];
        for (retry, secs) in (1..=5).zip(expected) {
            assert_eq!(message(retry).backoff_delay(base), Duration::from_secs(secs));
        }
    }

    #[test]
    fn fresh_record_is_due_immediately() {
        assert!(message(0).is_due(Utc::now(), Duration::from_secs(5)));
    }

    #[test]
    fn record_inside_backoff_window_is_not_due() {
        let mut msg = message(1);
        msg.last_attempt_at = Some(Utc::now());
        assert!(!msg.is_due(Utc::now(), Duration::from_secs(5)));
    }

    #[test]
    fn record_past_backoff_window_is_due() {
        let mut msg = message(2);
        msg.last_attempt_at = Some(Utc::now() - chrono::Duration::seconds(11));
        assert!(msg.is_due(Utc::now(), Duration::from_secs(5)));
    }

    /// Backoff is anchored to the last attempt, not record creation.
    #[test]
    fn backoff_reference_falls_back_to_created_at() {
        let mut msg = message(1);
        msg.created_at = Utc::now() - chrono::Duration::seconds(6);
        msg.last_attempt_at = None;
        assert!(msg.is_due(Utc::now(), Duration::from_secs(5)));

        msg.last_attempt_at = Some(Utc::now());
        assert!(!msg.is_due(Utc::now(), Duration::from_secs(5)));
    }
}
