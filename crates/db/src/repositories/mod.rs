//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod outbox_repo;

pub use outbox_repo::OutboxRepo;
