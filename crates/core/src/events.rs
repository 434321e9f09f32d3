//! User-lifecycle domain events and the [`DomainEvent`] trait.
//!
//! Every event carries a stable, dot-separated wire name as an associated
//! constant. That name is what the outbox stores and what the bus sees, so
//! it must never change once records referencing it exist.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Timestamp;

/// A domain event that can be staged in the outbox and delivered to the bus.
///
/// Implementors are plain serde structs; the pipeline never inspects the
/// payload beyond serializing it on publish and re-validating it on retry.
pub trait DomainEvent: Serialize {
    /// Stable wire name, e.g. `"user.created"`.
    const EVENT_TYPE: &'static str;
}

/// Published when a user account is created.
///
/// Consumed by downstream services to provision their own view of the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreatedEvent {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub is_enabled: bool,
    pub timestamp: Timestamp,
}

impl DomainEvent for UserCreatedEvent {
    const EVENT_TYPE: &'static str = "user.created";
}

/// Published when a user's profile or role changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdatedEvent {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub is_enabled: bool,
    pub timestamp: Timestamp,
}

impl DomainEvent for UserUpdatedEvent {
    const EVENT_TYPE: &'static str = "user.updated";
}

/// Published when a user account is disabled (soft delete).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDisabledEvent {
    pub user_id: Uuid,
    pub timestamp: Timestamp,
}

impl DomainEvent for UserDisabledEvent {
    const EVENT_TYPE: &'static str = "user.disabled";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn user_created_serializes_all_fields() {
        let event = UserCreatedEvent {
            user_id: Uuid::new_v4(),
            username: "jdoe".into(),
            email: "jdoe@example.com".into(),
            first_name: Some("Jane".into()),
            last_name: None,
            role: Some("producer".into()),
            is_enabled: true,
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&event).expect("serialization should succeed");
        assert_eq!(value["username"], "jdoe");
        assert_eq!(value["email"], "jdoe@example.com");
        assert_eq!(value["first_name"], "Jane");
        assert!(value["last_name"].is_null());
        assert_eq!(value["is_enabled"], true);
    }

    #[test]
    fn wire_names_are_stable() {
        assert_eq!(UserCreatedEvent::EVENT_TYPE, "user.created");
        assert_eq!(UserUpdatedEvent::EVENT_TYPE, "user.updated");
        assert_eq!(UserDisabledEvent::EVENT_TYPE, "user.disabled");
    }

    #[test]
    fn user_disabled_round_trips_through_json() {
        let event = UserDisabledEvent {
            user_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&event).expect("serialization should succeed");
        let back: UserDisabledEvent =
            serde_json::from_value(value).expect("deserialization should succeed");
        assert_eq!(back.user_id, event.user_id);
    }
}
