//! Message-bus delivery gateway.
//!
//! [`HttpBusGateway`] pushes one event to the bus ingest endpoint per call.
//! There is deliberately no retry here: retry policy lives in the
//! [`OutboxProcessor`](crate::processor::OutboxProcessor), and the breaker
//! in front of the gateway decides whether a call happens at all.

use std::time::Duration;

use async_trait::async_trait;

/// Error type for a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("bus request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The bus answered with a non-2xx status code.
    #[error("bus returned HTTP {0}")]
    HttpStatus(u16),
}

/// One delivery attempt against the message bus.
///
/// Success means the bus acknowledged receipt; any transport or protocol
/// error is a failure. Implementations hold no state beyond a live
/// connection.
#[async_trait]
pub trait BusGateway: Send + Sync {
    async fn deliver(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<(), GatewayError>;
}

/// HTTP implementation of [`BusGateway`].
pub struct HttpBusGateway {
    client: reqwest::Client,
    url: String,
}

impl HttpBusGateway {
    /// Create a gateway for the given ingest endpoint.
    ///
    /// `attempt_timeout` bounds every delivery attempt, including the
    /// immediate one made on the publish path, so callers of `publish` are
    /// never blocked indefinitely.
    pub fn new(url: impl Into<String>, attempt_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(attempt_timeout)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl BusGateway for HttpBusGateway {
    async fn deliver(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "event_type": event_type,
            "payload": payload,
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(GatewayError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_display_http_status() {
        let err = GatewayError::HttpStatus(503);
        assert_eq!(err.to_string(), "bus returned HTTP 503");
    }

    #[test]
    fn new_does_not_panic() {
        let _gateway = HttpBusGateway::new("http://localhost:8080/events", Duration::from_secs(60));
    }
}
