//! Background redelivery loop.
//!
//! [`OutboxProcessor`] wakes on a fixed interval, selects a bounded batch of
//! undelivered records, and drives each one through the breaker-wrapped
//! gateway, honoring the exponential backoff schedule. Per-record failures
//! are logged and metered, never propagated: the loop always finishes its
//! cycle and goes back to sleep.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use relay_core::config::OutboxConfig;
use relay_db::models::outbox::OutboxMessage;

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::codec::EventCodec;
use crate::gateway::BusGateway;
use crate::metrics::Metrics;
use crate::store::{OutboxStore, StoreError};

/// Outcome counts for one processor cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Records returned by batch selection.
    pub selected: usize,
    /// Records the bus acknowledged this cycle.
    pub delivered: usize,
    /// Records returned to `pending` for a later cycle.
    pub retried: usize,
    /// Records moved to the terminal `failed` state.
    pub failed: usize,
    /// Records still inside their backoff window.
    pub skipped: usize,
}

/// Recurring worker that redelivers staged events until they succeed or are
/// permanently abandoned.
pub struct OutboxProcessor {
    store: Arc<dyn OutboxStore>,
    gateway: Arc<dyn BusGateway>,
    breaker: Arc<CircuitBreaker>,
    codec: EventCodec,
    config: OutboxConfig,
}

impl OutboxProcessor {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        gateway: Arc<dyn BusGateway>,
        breaker: Arc<CircuitBreaker>,
        codec: EventCodec,
        config: OutboxConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            breaker,
            codec,
            config,
        }
    }

    /// Run the redelivery loop.
    ///
    /// Exits when `cancel` is triggered. Cancellation is observed between
    /// records, never mid-record, so shutdown latency is bounded by one
    /// delivery attempt rather than a full cycle.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "Outbox processor started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Outbox processor stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.run_once(&cancel).await {
                        Ok(stats) if stats.selected > 0 => {
                            tracing::info!(
                                selected = stats.selected,
                                delivered = stats.delivered,
                                retried = stats.retried,
                                failed = stats.failed,
                                skipped = stats.skipped,
                                "Outbox cycle complete"
                            );
                        }
                        Ok(_) => {
                            tracing::debug!("Outbox cycle found no work");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Outbox cycle failed");
                        }
                    }
                }
            }
        }
    }

    /// Process one batch now.
    ///
    /// Selection errors propagate (there is nothing to iterate); everything
    /// per-record is handled in place.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<CycleStats, StoreError> {
        let batch = self
            .store
            .select_batch(self.config.batch_size, self.config.max_retries)
            .await?;

        let mut stats = CycleStats {
            selected: batch.len(),
            ..CycleStats::default()
        };

        for message in batch {
            if cancel.is_cancelled() {
                tracing::info!("Cancellation observed mid-cycle, leaving remaining records");
                break;
            }
            self.process_record(message, &mut stats).await;
        }

        self.refresh_backlog_gauge().await;

        Ok(stats)
    }

    async fn process_record(&self, message: OutboxMessage, stats: &mut CycleStats) {
        if !message.is_due(Utc::now(), self.config.backoff_base) {
            tracing::debug!(
                record_id = %message.id,
                retry_count = message.retry_count,
                "Record still inside its backoff window"
            );
            stats.skipped += 1;
            return;
        }

        // Structural problems cannot be fixed by retrying.
        if let Err(e) = self.codec.decode(&message.event_type, &message.payload) {
            tracing::error!(
                record_id = %message.id,
                event_type = %message.event_type,
                error = %e,
                "Record cannot be decoded, abandoning"
            );
            if let Some(metrics) = Metrics::get() {
                metrics.record_failed(&message.event_type, "codec");
            }
            if let Err(store_err) = self.store.mark_failed(message.id, &e.to_string()).await {
                tracing::error!(record_id = %message.id, error = %store_err, "Failed to abandon record");
                return;
            }
            stats.failed += 1;
            return;
        }

        let attempt = match self.store.begin_attempt(message.id).await {
            Ok(Some(attempt)) => attempt,
            Ok(None) => {
                // The publish path settled this record first.
                tracing::debug!(record_id = %message.id, "Record already terminal, skipping");
                return;
            }
            Err(e) => {
                tracing::error!(record_id = %message.id, error = %e, "Failed to claim record");
                return;
            }
        };

        tracing::debug!(
            record_id = %message.id,
            event_type = %message.event_type,
            attempt,
            max_retries = self.config.max_retries,
            "Attempting redelivery"
        );

        let result = self
            .breaker
            .call(|| self.gateway.deliver(&message.event_type, &message.payload))
            .await;

        match result {
            Ok(()) => {
                if let Err(e) = self.store.mark_delivered(message.id).await {
                    tracing::error!(
                        record_id = %message.id,
                        error = %e,
                        "Delivered but could not mark the record"
                    );
                    return;
                }
                if let Some(metrics) = Metrics::get() {
                    metrics.record_published(&message.event_type);
                }
                tracing::info!(
                    record_id = %message.id,
                    event_type = %message.event_type,
                    attempt,
                    "Outbox record delivered"
                );
                stats.delivered += 1;
            }
            Err(e) => {
                self.settle_failed_attempt(&message, attempt, &e, stats).await;
            }
        }
    }

    async fn settle_failed_attempt(
        &self,
        message: &OutboxMessage,
        attempt: i32,
        error: &BreakerError,
        stats: &mut CycleStats,
    ) {
        let exhausted = attempt >= self.config.max_retries;
        let reason = if exhausted {
            "retries_exhausted"
        } else {
            match error {
                BreakerError::Open => "breaker_open",
                BreakerError::Gateway(_) => "gateway",
            }
        };
        if let Some(metrics) = Metrics::get() {
            metrics.record_failed(&message.event_type, reason);
        }

        if exhausted {
            if let Err(store_err) = self.store.mark_failed(message.id, &error.to_string()).await {
                tracing::error!(record_id = %message.id, error = %store_err, "Failed to abandon record");
                return;
            }
            tracing::warn!(
                record_id = %message.id,
                event_type = %message.event_type,
                attempts = attempt,
                error = %error,
                "Outbox record abandoned after exhausting its retry budget"
            );
            stats.failed += 1;
        } else {
            if let Err(store_err) = self.store.mark_retry(message.id, &error.to_string()).await {
                tracing::error!(record_id = %message.id, error = %store_err, "Failed to requeue record");
                return;
            }
            tracing::warn!(
                record_id = %message.id,
                event_type = %message.event_type,
                attempt,
                error = %error,
                "Redelivery attempt failed, will retry"
            );
            stats.retried += 1;
        }
    }

    async fn refresh_backlog_gauge(&self) {
        let Some(metrics) = Metrics::get() else {
            return;
        };
        match self.store.counts_by_status().await {
            Ok(counts) => {
                for (status, count) in counts {
                    metrics.set_backlog(status.as_str(), count);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Could not refresh backlog gauge");
            }
        }
    }
}
