use std::time::Duration;

/// Pipeline configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// How often the redelivery worker wakes up.
    pub poll_interval: Duration,
    /// Maximum records selected per worker cycle.
    pub batch_size: i64,
    /// Background delivery attempts before a record is abandoned.
    pub max_retries: i32,
    /// Base of the exponential backoff schedule.
    pub backoff_base: Duration,
    /// Consecutive gateway failures before the breaker opens.
    pub breaker_failure_threshold: u32,
    /// How long the breaker stays open before probing.
    pub breaker_cooldown: Duration,
    /// Timeout for a single delivery attempt against the bus.
    pub attempt_timeout: Duration,
    /// Message-bus ingest endpoint.
    pub bus_url: String,
    /// Bind port for the Prometheus exporter.
    pub metrics_port: u16,
}

impl OutboxConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                          |
    /// |------------------------------|----------------------------------|
    /// | `OUTBOX_POLL_INTERVAL_SECS`  | `10`                             |
    /// | `OUTBOX_BATCH_SIZE`          | `100`                            |
    /// | `OUTBOX_MAX_RETRIES`         | `5`                              |
    /// | `OUTBOX_BACKOFF_BASE_SECS`   | `5`                              |
    /// | `BREAKER_FAILURE_THRESHOLD`  | `5`                              |
    /// | `BREAKER_COOLDOWN_SECS`      | `30`                             |
    /// | `BUS_ATTEMPT_TIMEOUT_SECS`   | `60`                             |
    /// | `BUS_URL`                    | `http://localhost:8080/events`   |
    /// | `METRICS_PORT`               | `9090`                           |
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(env_u64("OUTBOX_POLL_INTERVAL_SECS", 10)),
            batch_size: std::env::var("OUTBOX_BATCH_SIZE")
                .unwrap_or_else(|_| "100".into())
                .parse()
                .expect("OUTBOX_BATCH_SIZE must be a valid i64"),
            max_retries: std::env::var("OUTBOX_MAX_RETRIES")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .expect("OUTBOX_MAX_RETRIES must be a valid i32"),
            backoff_base: Duration::from_secs(env_u64("OUTBOX_BACKOFF_BASE_SECS", 5)),
            breaker_failure_threshold: std::env::var("BREAKER_FAILURE_THRESHOLD")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .expect("BREAKER_FAILURE_THRESHOLD must be a valid u32"),
            breaker_cooldown: Duration::from_secs(env_u64("BREAKER_COOLDOWN_SECS", 30)),
            attempt_timeout: Duration::from_secs(env_u64("BUS_ATTEMPT_TIMEOUT_SECS", 60)),
            bus_url: std::env::var("BUS_URL")
                .unwrap_or_else(|_| "http://localhost:8080/events".into()),
            metrics_port: std::env::var("METRICS_PORT")
                .unwrap_or_else(|_| "9090".into())
                .parse()
                .expect("METRICS_PORT must be a valid u16"),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            batch_size: 100,
            max_retries: 5,
            backoff_base: Duration::from_secs(5),
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(60),
            bus_url: "http://localhost:8080/events".into(),
            metrics_port: 9090,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = OutboxConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_base, Duration::from_secs(5));
        assert_eq!(config.breaker_failure_threshold, 5);
        assert_eq!(config.breaker_cooldown, Duration::from_secs(30));
        assert_eq!(config.attempt_timeout, Duration::from_secs(60));
        assert_eq!(config.metrics_port, 9090);
    }
}
