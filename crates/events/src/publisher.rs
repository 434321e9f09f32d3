//! The publish entry point used by application code.
//!
//! `publish` stages the event durably, then makes one immediate delivery
//! attempt through the breaker. Only the durable write can fail the call:
//! once the record is staged, delivery failure merely defers the event to
//! the redelivery worker and the caller still observes success.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use relay_core::events::DomainEvent;

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::gateway::BusGateway;
use crate::metrics::Metrics;
use crate::store::{OutboxStore, StoreError};

/// Error type for `publish`. Either way the event was NOT accepted.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The event could not be serialized into a storable payload.
    #[error("failed to serialize event payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The outbox write failed; nothing was staged.
    #[error("failed to stage event in the outbox: {0}")]
    Store(#[from] StoreError),
}

/// How an accepted event left the publish path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The bus acknowledged the immediate attempt.
    Delivered,
    /// The record is staged and the redelivery worker will drive it.
    Deferred,
}

/// Returned for every accepted event.
#[derive(Debug, Clone, Copy)]
pub struct PublishReceipt {
    pub record_id: Uuid,
    pub outcome: PublishOutcome,
}

/// Durable-write-first event publisher.
pub struct EventPublisher {
    store: Arc<dyn OutboxStore>,
    gateway: Arc<dyn BusGateway>,
    breaker: Arc<CircuitBreaker>,
}

impl EventPublisher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        gateway: Arc<dyn BusGateway>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            store,
            gateway,
            breaker,
        }
    }

    /// Publish a domain event.
    ///
    /// Returns `Ok` as soon as the event is durably staged, whether or not
    /// the immediate delivery attempt succeeded; the receipt says which.
    pub async fn publish<E: DomainEvent>(&self, event: &E) -> Result<PublishReceipt, PublishError> {
        let payload = serde_json::to_value(event)?;
        self.publish_raw(E::EVENT_TYPE, payload).await
    }

    /// Publish an already-serialized payload under a stable wire name.
    pub async fn publish_raw(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<PublishReceipt, PublishError> {
        let span = tracing::info_span!(
            "publish_event",
            event_type,
            outcome = tracing::field::Empty
        );

        async {
            let started = Instant::now();

            let record_id = self.store.insert(event_type, &payload).await?;
            tracing::debug!(record_id = %record_id, "Event staged in outbox");

            let result = self
                .breaker
                .call(|| self.gateway.deliver(event_type, &payload))
                .await;

            let outcome = match result {
                Ok(()) => {
                    // A failure here is recoverable: the record stays
                    // pending and the worker redelivers it (the bus may see
                    // a duplicate, which at-least-once allows).
                    if let Err(e) = self.store.mark_delivered(record_id).await {
                        tracing::warn!(
                            record_id = %record_id,
                            error = %e,
                            "Delivered but could not mark the record, it will be redelivered"
                        );
                    }
                    if let Some(metrics) = Metrics::get() {
                        metrics.record_published(event_type);
                    }
                    tracing::info!(record_id = %record_id, "Event published");
                    PublishOutcome::Delivered
                }
                Err(BreakerError::Open) => {
                    if let Some(metrics) = Metrics::get() {
                        metrics.record_failed(event_type, "breaker_open");
                    }
                    tracing::warn!(
                        record_id = %record_id,
                        "Circuit breaker open, event deferred to the redelivery worker"
                    );
                    PublishOutcome::Deferred
                }
                Err(BreakerError::Gateway(e)) => {
                    if let Some(metrics) = Metrics::get() {
                        metrics.record_failed(event_type, "gateway");
                    }
                    tracing::warn!(
                        record_id = %record_id,
                        error = %e,
                        "Immediate delivery failed, event deferred to the redelivery worker"
                    );
                    PublishOutcome::Deferred
                }
            };

            if let Some(metrics) = Metrics::get() {
                metrics.observe_publish_duration(event_type, started.elapsed().as_secs_f64());
            }
            tracing::Span::current().record(
                "outcome",
                match outcome {
                    PublishOutcome::Delivered => "delivered",
                    PublishOutcome::Deferred => "deferred",
                },
            );

            Ok(PublishReceipt { record_id, outcome })
        }
        .instrument(span)
        .await
    }
}
