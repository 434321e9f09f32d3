//! Payload validation for records read back from the outbox.
//!
//! A record that can no longer be decoded — unknown wire name, or a payload
//! that no longer matches its event shape — will never deliver no matter how
//! often it is retried, so the processor moves it straight to `Failed`
//! instead of burning retry budget on it.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use relay_core::events::DomainEvent;

type Validator = Box<dyn Fn(&serde_json::Value) -> Result<(), serde_json::Error> + Send + Sync>;

/// Error type for codec checks. Both variants are non-retriable.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// No event is registered under this wire name.
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    /// The payload does not deserialize into the registered event shape.
    #[error("payload does not match event type '{event_type}': {source}")]
    Payload {
        event_type: String,
        source: serde_json::Error,
    },
}

/// Registry mapping stable wire names to payload validators.
#[derive(Default)]
pub struct EventCodec {
    validators: HashMap<&'static str, Validator>,
}

impl EventCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event type under its stable wire name.
    pub fn register<E>(mut self) -> Self
    where
        E: DomainEvent + DeserializeOwned,
    {
        self.validators.insert(
            E::EVENT_TYPE,
            Box::new(|payload| E::deserialize(payload).map(|_| ())),
        );
        self
    }

    /// Check that a stored record still decodes into a known event.
    pub fn decode(&self, event_type: &str, payload: &serde_json::Value) -> Result<(), CodecError> {
        let validator = self
            .validators
            .get(event_type)
            .ok_or_else(|| CodecError::UnknownEventType(event_type.to_string()))?;
        validator(payload).map_err(|source| CodecError::Payload {
            event_type: event_type.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use relay_core::events::UserDisabledEvent;
    use uuid::Uuid;

    fn codec() -> EventCodec {
        EventCodec::new().register::<UserDisabledEvent>()
    }

    #[test]
    fn known_event_with_valid_payload_decodes() {
        let payload = serde_json::to_value(UserDisabledEvent {
            user_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        })
        .unwrap();

        assert!(codec().decode("user.disabled", &payload).is_ok());
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let result = codec().decode("user.vanished", &serde_json::json!({}));
        assert_matches!(result, Err(CodecError::UnknownEventType(name)) if name == "user.vanished");
    }

    #[test]
    fn corrupt_payload_is_rejected() {
        let result = codec().decode("user.disabled", &serde_json::json!({"user_id": 7}));
        assert_matches!(result, Err(CodecError::Payload { event_type, .. }) if event_type == "user.disabled");
    }
}
