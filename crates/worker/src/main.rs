use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_core::config::OutboxConfig;
use relay_core::events::{UserCreatedEvent, UserDisabledEvent, UserUpdatedEvent};
use relay_events::metrics::Metrics;
use relay_events::{
    CircuitBreaker, EventCodec, HttpBusGateway, OutboxProcessor, PgOutboxStore,
};

mod metrics_server;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_worker=debug,relay_events=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = OutboxConfig::from_env();
    tracing::info!(
        bus_url = %config.bus_url,
        poll_interval_secs = config.poll_interval.as_secs(),
        batch_size = config.batch_size,
        max_retries = config.max_retries,
        "Loaded pipeline configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = relay_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    relay_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    relay_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Metrics ---
    Metrics::init().expect("Failed to register metrics");
    let metrics_handle = metrics_server::start(config.metrics_port);

    // --- Pipeline ---
    let store = Arc::new(PgOutboxStore::new(pool.clone()));
    let gateway = Arc::new(HttpBusGateway::new(
        config.bus_url.clone(),
        config.attempt_timeout,
    ));
    let breaker = Arc::new(CircuitBreaker::new(
        config.breaker_failure_threshold,
        config.breaker_cooldown,
    ));
    let codec = EventCodec::new()
        .register::<UserCreatedEvent>()
        .register::<UserUpdatedEvent>()
        .register::<UserDisabledEvent>();

    let processor = OutboxProcessor::new(store, gateway, breaker, codec, config);

    let cancel = CancellationToken::new();
    let processor_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { processor.run(cancel).await })
    };
    tracing::info!("Outbox processor started");

    // --- Shutdown ---
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received, draining");
    cancel.cancel();

    if let Err(e) = processor_handle.await {
        tracing::error!(error = %e, "Outbox processor task failed");
    }
    metrics_handle.abort();
    tracing::info!("Worker stopped");
}
