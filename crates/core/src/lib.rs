//! Shared domain types for the relay event pipeline.
//!
//! This crate carries everything the other crates agree on:
//!
//! - [`types`] — workspace-wide primitive aliases.
//! - [`events`] — the [`DomainEvent`](events::DomainEvent) trait and the
//!   user-lifecycle events published by the identity service.
//! - [`config`] — environment-driven configuration for the pipeline.

pub mod config;
pub mod events;
pub mod types;

pub use config::OutboxConfig;
pub use events::{DomainEvent, UserCreatedEvent, UserDisabledEvent, UserUpdatedEvent};
