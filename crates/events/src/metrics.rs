//! Prometheus metrics for the event pipeline.

use std::sync::OnceLock;

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Error type for metrics registration.
#[derive(Debug, thiserror::Error)]
#[error("metrics registration failed: {0}")]
pub struct MetricsError(String);

/// All pipeline metrics.
pub struct Metrics {
    /// Events acknowledged by the bus (by event type).
    pub events_published: IntCounterVec,

    /// Failed publish/redelivery attempts (by event type and reason).
    pub events_failed: IntCounterVec,

    /// Duration of publish calls, staging plus immediate attempt.
    pub publish_duration: HistogramVec,

    /// Breaker state: 0 closed, 1 half-open, 2 open.
    pub breaker_state: IntGauge,

    /// Outbox record counts by status, refreshed each processor cycle.
    pub outbox_backlog: IntGaugeVec,
}

impl Metrics {
    /// Initialize metrics (call once at startup).
    ///
    /// Idempotent: later calls return the existing instance.
    pub fn init() -> Result<&'static Metrics, MetricsError> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            events_published: register_int_counter_vec!(
                "relay_events_published_total",
                "Total events successfully delivered to the bus",
                &["event_type"]
            )
            .map_err(|e| MetricsError(format!("events_published: {e}")))?,

            events_failed: register_int_counter_vec!(
                "relay_events_failed_total",
                "Total failed delivery attempts",
                &["event_type", "reason"]
            )
            .map_err(|e| MetricsError(format!("events_failed: {e}")))?,

            publish_duration: register_histogram_vec!(
                "relay_publish_duration_seconds",
                "Duration of publish operations",
                &["event_type"]
            )
            .map_err(|e| MetricsError(format!("publish_duration: {e}")))?,

            breaker_state: register_int_gauge!(
                "relay_breaker_state",
                "Circuit breaker state (0 = closed, 1 = half-open, 2 = open)"
            )
            .map_err(|e| MetricsError(format!("breaker_state: {e}")))?,

            outbox_backlog: register_int_gauge_vec!(
                "relay_outbox_backlog",
                "Outbox record counts by status",
                &["status"]
            )
            .map_err(|e| MetricsError(format!("outbox_backlog: {e}")))?,
        };

        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| MetricsError("failed to initialize metrics".into()))
    }

    /// Get the global metrics instance.
    ///
    /// Returns `None` if metrics haven't been initialized; recording sites
    /// treat that as a no-op so the pipeline runs fine without them.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    /// Record a successful delivery.
    pub fn record_published(&self, event_type: &str) {
        self.events_published.with_label_values(&[event_type]).inc();
    }

    /// Record a failed attempt with its reason label.
    pub fn record_failed(&self, event_type: &str, reason: &str) {
        self.events_failed
            .with_label_values(&[event_type, reason])
            .inc();
    }

    /// Observe the duration of one publish call.
    pub fn observe_publish_duration(&self, event_type: &str, seconds: f64) {
        self.publish_duration
            .with_label_values(&[event_type])
            .observe(seconds);
    }

    /// Update the breaker state gauge.
    pub fn set_breaker_state(&self, state: i64) {
        self.breaker_state.set(state);
    }

    /// Update one status bucket of the backlog gauge.
    pub fn set_backlog(&self, status: &str, count: i64) {
        self.outbox_backlog.with_label_values(&[status]).set(count);
    }
}

/// Encode the default registry in Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_counters_accumulate() {
        let metrics = Metrics::init().expect("first init succeeds");
        let again = Metrics::init().expect("second init returns the instance");
        assert!(std::ptr::eq(metrics, again));

        metrics.record_published("user.created");
        metrics.record_failed("user.created", "gateway");
        metrics.observe_publish_duration("user.created", 0.002);
        metrics.set_breaker_state(2);
        metrics.set_backlog("pending", 7);

        let text = gather();
        assert!(text.contains("relay_events_published_total"));
        assert!(text.contains("relay_breaker_state 2"));
    }
}
