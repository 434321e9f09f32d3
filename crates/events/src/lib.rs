//! Resilient event-publication pipeline.
//!
//! This crate provides the building blocks that carry a domain event from
//! the moment application code produces it to the moment the message bus
//! acknowledges it:
//!
//! - [`OutboxStore`](store::OutboxStore) — the durable staging ledger, with
//!   Postgres and in-memory implementations.
//! - [`BusGateway`](gateway::BusGateway) — a single delivery attempt against
//!   the bus, no internal retry.
//! - [`CircuitBreaker`](breaker::CircuitBreaker) — fails fast while the bus
//!   is known to be down.
//! - [`EventPublisher`](publisher::EventPublisher) — durable write first,
//!   then an immediate breaker-wrapped delivery attempt.
//! - [`OutboxProcessor`](processor::OutboxProcessor) — background redelivery
//!   loop with exponential backoff and a terminal failure state.
//! - [`EventCodec`](codec::EventCodec) — payload validation for records read
//!   back from the ledger.
//! - [`metrics`] — the Prometheus registry fed by all of the above.

pub mod breaker;
pub mod codec;
pub mod gateway;
pub mod metrics;
pub mod processor;
pub mod publisher;
pub mod store;

pub use breaker::{BreakerError, BreakerState, CircuitBreaker};
pub use codec::{CodecError, EventCodec};
pub use gateway::{BusGateway, GatewayError, HttpBusGateway};
pub use processor::{CycleStats, OutboxProcessor};
pub use publisher::{EventPublisher, PublishError, PublishOutcome, PublishReceipt};
pub use store::{MemoryOutboxStore, OutboxStore, PgOutboxStore, StoreError};
