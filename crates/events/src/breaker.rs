//! Circuit breaker guarding the bus gateway.
//!
//! Tracks consecutive failures and fails fast once the bus is known to be
//! down, so an outage does not pile blocked delivery attempts onto a
//! struggling broker. State transitions:
//!
//! ```text
//! Closed --(threshold consecutive failures)--> Open
//! Open   --(cooldown elapsed)--> HalfOpen (one probe admitted)
//! HalfOpen --(probe succeeds)--> Closed
//! HalfOpen --(probe fails)--> Open (cooldown restarts)
//! ```

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::gateway::GatewayError;
use crate::metrics::Metrics;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    fn as_gauge(self) -> i64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::HalfOpen => 1,
            BreakerState::Open => 2,
        }
    }
}

/// Error type surfaced by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError {
    /// The breaker is open; the gateway was not invoked.
    #[error("circuit breaker is open")]
    Open,

    /// The gateway was invoked and the attempt failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

// `HalfOpen` exists only while the single admitted probe is in flight;
// concurrent callers observe it as open.
enum Inner {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Shared failure guard in front of the bus gateway.
///
/// All publish calls and the redelivery loop go through the same instance,
/// so the failure count reflects the bus, not any single caller.
pub struct CircuitBreaker {
    state: Mutex<Inner>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(Inner::Closed { failures: 0 }),
            failure_threshold,
            cooldown,
        }
    }

    /// Run one gateway operation under the breaker.
    ///
    /// While open, returns [`BreakerError::Open`] without invoking `op`.
    /// Once the cooldown has elapsed, exactly one caller is admitted as the
    /// recovery probe; its outcome decides the next state.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.acquire()?;
        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure(&err);
                Err(BreakerError::Gateway(err))
            }
        }
    }

    /// Current state, for logs and tests.
    pub fn state(&self) -> BreakerState {
        match *self.state.lock().expect("breaker state lock poisoned") {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen => BreakerState::HalfOpen,
        }
    }

    fn acquire(&self) -> Result<(), BreakerError> {
        let mut state = self.state.lock().expect("breaker state lock poisoned");
        match *state {
            Inner::Closed { .. } => Ok(()),
            Inner::Open { since } => {
                if since.elapsed() >= self.cooldown {
                    *state = Inner::HalfOpen;
                    Self::record_state(BreakerState::HalfOpen);
                    tracing::info!("Circuit breaker half-open, probing the bus");
                    Ok(())
                } else {
                    Err(BreakerError::Open)
                }
            }
            // A probe is already in flight.
            Inner::HalfOpen => Err(BreakerError::Open),
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock().expect("breaker state lock poisoned");
        match *state {
            Inner::HalfOpen => {
                *state = Inner::Closed { failures: 0 };
                Self::record_state(BreakerState::Closed);
                tracing::info!("Circuit breaker closed, bus connection restored");
            }
            Inner::Closed { failures } if failures > 0 => {
                *state = Inner::Closed { failures: 0 };
            }
            // A success from a call admitted before the breaker opened does
            // not short-circuit the cooldown.
            _ => {}
        }
    }

    fn on_failure(&self, err: &GatewayError) {
        let mut state = self.state.lock().expect("breaker state lock poisoned");
        match *state {
            Inner::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    *state = Inner::Open {
                        since: Instant::now(),
                    };
                    Self::record_state(BreakerState::Open);
                    tracing::warn!(
                        error = %err,
                        cooldown_secs = self.cooldown.as_secs(),
                        failures,
                        "Circuit breaker opened after consecutive failures"
                    );
                } else {
                    *state = Inner::Closed { failures };
                }
            }
            Inner::HalfOpen => {
                *state = Inner::Open {
                    since: Instant::now(),
                };
                Self::record_state(BreakerState::Open);
                tracing::warn!(error = %err, "Circuit breaker probe failed, reopening");
            }
            Inner::Open { .. } => {}
        }
    }

    fn record_state(state: BreakerState) {
        if let Some(metrics) = Metrics::get() {
            metrics.set_breaker_state(state.as_gauge());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COOLDOWN: Duration = Duration::from_millis(50);

    fn failing() -> Result<(), GatewayError> {
        Err(GatewayError::HttpStatus(503))
    }

    async fn trip(breaker: &CircuitBreaker, times: u32) {
        for _ in 0..times {
            let _ = breaker.call(|| async { failing() }).await;
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(5, COOLDOWN);

        trip(&breaker, 4).await;
        assert_eq!(breaker.state(), BreakerState::Closed);

        trip(&breaker, 1).await;
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn a_success_resets_the_failure_count() {
        let breaker = CircuitBreaker::new(3, COOLDOWN);

        trip(&breaker, 2).await;
        breaker
            .call(|| async { Ok(()) })
            .await
            .expect("closed breaker passes the call through");

        // The two earlier failures no longer count toward the threshold.
        trip(&breaker, 2).await;
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn open_breaker_fails_fast_without_invoking_the_gateway() {
        let breaker = CircuitBreaker::new(1, COOLDOWN);
        trip(&breaker, 1).await;

        let calls = AtomicUsize::new(0);
        let result = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                failing()
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn probe_success_closes_the_breaker() {
        let breaker = CircuitBreaker::new(1, COOLDOWN);
        trip(&breaker, 1).await;

        tokio::time::sleep(COOLDOWN + Duration::from_millis(10)).await;
        breaker
            .call(|| async { Ok(()) })
            .await
            .expect("probe should be admitted and succeed");
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn probe_failure_reopens_and_restarts_the_cooldown() {
        let breaker = CircuitBreaker::new(1, COOLDOWN);
        trip(&breaker, 1).await;

        tokio::time::sleep(COOLDOWN + Duration::from_millis(10)).await;
        let result = breaker.call(|| async { failing() }).await;
        assert!(matches!(result, Err(BreakerError::Gateway(_))));
        assert_eq!(breaker.state(), BreakerState::Open);

        // Still inside the restarted cooldown: fail fast again.
        let result = breaker.call(|| async { failing() }).await;
        assert!(matches!(result, Err(BreakerError::Open)));
    }

    #[tokio::test]
    async fn only_one_probe_is_admitted_while_half_open() {
        let breaker = CircuitBreaker::new(1, COOLDOWN);
        trip(&breaker, 1).await;
        tokio::time::sleep(COOLDOWN + Duration::from_millis(10)).await;

        // First caller is admitted as the probe and holds HalfOpen while
        // its future is pending; a second caller must be rejected.
        let probe = breaker.call(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        });
        tokio::pin!(probe);

        // Poll the probe once so it acquires the half-open slot.
        tokio::select! {
            biased;
            _ = &mut probe => panic!("probe should still be sleeping"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }

        let second = breaker.call(|| async { Ok(()) }).await;
        assert!(matches!(second, Err(BreakerError::Open)));

        probe.await.expect("probe completes and closes the breaker");
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
