//! Row structs for the outbox ledger.

pub mod outbox;

pub use outbox::{OutboxMessage, OutboxStatus};
