//! Event trait and the two event shapes that cross the store boundary.
//!
//! Events represent facts about things that have happened in the past and are
//! immutable once appended.
//!
//! # Design
//!
//! Domain code works with a typed event enum implementing [`Event`]. The store
//! only sees the untyped shapes:
//!
//! - [`EventInput`]: what a caller hands to `append_events` (type name + payload)
//! - [`RecordedEvent`]: what the store hands back, stamped with its stream
//!   sequence, global offset and recording time
//!
//! Payloads are JSON maps. Typed events validate their payload when they are
//! decoded, so a malformed payload is reported as [`EventError::InvalidPayload`]
//! before it can reach the store or a projection.
//!
//! # Example
//!
//! ```
//! use foldstream_core::event::{Event, EventError, EventInput, Payload};
//! use serde_json::json;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum CounterEvent {
//!     Incremented { by: i64 },
//! }
//!
//! impl Event for CounterEvent {
//!     fn event_type(&self) -> &'static str {
//!         "Incremented"
//!     }
//!
//!     fn is_known_type(event_type: &str) -> bool {
//!         event_type == "Incremented"
//!     }
//!
//!     fn to_payload(&self) -> Result<Payload, EventError> {
//!         let Self::Incremented { by } = self;
//!         let mut payload = Payload::new();
//!         payload.insert("by".to_string(), json!(by));
//!         Ok(payload)
//!     }
//!
//!     fn from_payload(event_type: &str, payload: &Payload) -> Result<Self, EventError> {
//!         let by = payload
//!             .get("by")
//!             .and_then(serde_json::Value::as_i64)
//!             .ok_or_else(|| EventError::invalid_payload(event_type, "missing `by`"))?;
//!         Ok(Self::Incremented { by })
//!     }
//! }
//!
//! let input = EventInput::from_event(&CounterEvent::Incremented { by: 2 }).unwrap();
//! assert_eq!(input.event_type(), "Incremented");
//! ```

use crate::stream::{GlobalOffset, StreamId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Event payload: a JSON object keyed by field name.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Error types for event construction and decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The payload is missing a required field or a field has the wrong shape.
    #[error("Invalid payload for {event_type}: {reason}")]
    InvalidPayload {
        /// Event type whose payload failed validation.
        event_type: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A typed decoder was asked to decode a type it does not define.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// The event type name itself is unusable (e.g. empty).
    #[error("Invalid event type: {0:?}")]
    InvalidEventType(String),

    /// Failed to convert a typed event to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EventError {
    /// Shorthand for [`EventError::InvalidPayload`].
    #[must_use]
    pub fn invalid_payload(event_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }
}

/// A typed domain event that can be stored and replayed.
///
/// Implementations are usually a tagged enum with one variant per event kind,
/// so every projection matches on it exhaustively.
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` so they can cross task boundaries.
pub trait Event: Sized + Send + Sync + 'static {
    /// Stable type name stored alongside the payload (e.g. `"OrderCreated"`).
    fn event_type(&self) -> &'static str;

    /// Whether `event_type` is one of the names this enum decodes.
    ///
    /// Store-wide folds use this to skip events that belong to other domains.
    fn is_known_type(event_type: &str) -> bool;

    /// Encode the event body as a payload map.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the event cannot be encoded.
    fn to_payload(&self) -> Result<Payload, EventError>;

    /// Decode and validate an event from its type name and payload.
    ///
    /// # Errors
    ///
    /// - [`EventError::UnknownEventType`] if `event_type` is not defined here
    /// - [`EventError::InvalidPayload`] if required fields are missing or malformed
    fn from_payload(event_type: &str, payload: &Payload) -> Result<Self, EventError>;
}

/// An event ready to be appended: a type name and a payload.
///
/// Fields are private so every `EventInput` in circulation went through a
/// constructor that checked it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    event_type: String,
    payload: Payload,
}

impl EventInput {
    /// Create an event input from raw parts.
    ///
    /// This only checks the type name. Use [`EventInput::from_event`] or
    /// [`EventInput::validated`] when the payload must be validated; a store
    /// configured with a payload check runs [`EventInput::check`] on append.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidEventType`] if `event_type` is blank.
    pub fn new(event_type: impl Into<String>, payload: Payload) -> Result<Self, EventError> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(EventError::InvalidEventType(event_type));
        }
        Ok(Self {
            event_type,
            payload,
        })
    }

    /// Create an event input from a typed event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Serialization`] if the event cannot be encoded.
    pub fn from_event<E: Event>(event: &E) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            payload: event.to_payload()?,
        })
    }

    /// Validate raw parts through a typed event and return the checked input.
    ///
    /// # Errors
    ///
    /// Same as [`Event::from_payload`].
    pub fn validated<E: Event>(
        event_type: impl Into<String>,
        payload: Payload,
    ) -> Result<Self, EventError> {
        let input = Self::new(event_type, payload)?;
        E::from_payload(&input.event_type, &input.payload)?;
        Ok(input)
    }

    /// Check the payload against `E` if `E` defines this event type.
    ///
    /// Types `E` does not know pass unchanged, matching how folds skip them.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidPayload`] if the type is known but the
    /// payload does not decode.
    pub fn check<E: Event>(&self) -> Result<(), EventError> {
        if E::is_known_type(&self.event_type) {
            E::from_payload(&self.event_type, &self.payload)?;
        }
        Ok(())
    }

    /// The event type name.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The payload map.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Split into type name and payload.
    #[must_use]
    pub fn into_parts(self) -> (String, Payload) {
        (self.event_type, self.payload)
    }
}

impl fmt::Display for EventInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventInput {{ type: {}, fields: {} }}",
            self.event_type,
            self.payload.len()
        )
    }
}

/// An event as stored: the input plus the coordinates the store assigned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Stream the event was appended to.
    pub stream_id: StreamId,
    /// Position within the stream, starting at 0 and contiguous.
    pub sequence: Version,
    /// Position within the store-wide log, strictly increasing.
    pub global_offset: GlobalOffset,
    /// Recording time; never decreases along the global log.
    pub recorded_at: DateTime<Utc>,
    /// Event type name.
    pub event_type: String,
    /// Event payload.
    pub payload: Payload,
}

impl RecordedEvent {
    /// Decode into a typed event.
    ///
    /// Returns `Ok(None)` when `E` does not know this event type.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidPayload`] if the type is known but the
    /// payload does not match it.
    pub fn decode<E: Event>(&self) -> Result<Option<E>, EventError> {
        if !E::is_known_type(&self.event_type) {
            return Ok(None);
        }
        E::from_payload(&self.event_type, &self.payload).map(Some)
    }
}

impl fmt::Display for RecordedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} @{} {}",
            self.stream_id, self.sequence, self.global_offset, self.event_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq)]
    enum TestEvent {
        Created { id: String },
    }

    impl Event for TestEvent {
        fn event_type(&self) -> &'static str {
            "Created"
        }

        fn is_known_type(event_type: &str) -> bool {
            event_type == "Created"
        }

        fn to_payload(&self) -> Result<Payload, EventError> {
            let Self::Created { id } = self;
            let mut payload = Payload::new();
            payload.insert("id".to_string(), json!(id));
            Ok(payload)
        }

        fn from_payload(event_type: &str, payload: &Payload) -> Result<Self, EventError> {
            if !Self::is_known_type(event_type) {
                return Err(EventError::UnknownEventType(event_type.to_string()));
            }
            let id = payload
                .get("id")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| EventError::invalid_payload(event_type, "missing `id`"))?;
            Ok(Self::Created { id: id.to_string() })
        }
    }

    fn recorded(event_type: &str, payload: Payload) -> RecordedEvent {
        RecordedEvent {
            stream_id: StreamId::new("s"),
            sequence: Version::INITIAL,
            global_offset: GlobalOffset::START,
            recorded_at: Utc::now(),
            event_type: event_type.to_string(),
            payload,
        }
    }

    #[test]
    fn blank_event_type_is_rejected() {
        let result = EventInput::new("  ", Payload::new());
        assert!(matches!(result, Err(EventError::InvalidEventType(_))));
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if encoding fails
    fn from_event_uses_type_name_and_payload() {
        let input = EventInput::from_event(&TestEvent::Created {
            id: "a".to_string(),
        })
        .expect("encoding should succeed");

        assert_eq!(input.event_type(), "Created");
        assert_eq!(input.payload().get("id"), Some(&json!("a")));
    }

    #[test]
    fn validated_rejects_missing_fields() {
        let result = EventInput::validated::<TestEvent>("Created", Payload::new());
        assert!(matches!(result, Err(EventError::InvalidPayload { .. })));
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if construction fails
    fn check_validates_known_types_only() {
        let malformed = EventInput::new("Created", Payload::new()).expect("type name is fine");
        assert!(matches!(
            malformed.check::<TestEvent>(),
            Err(EventError::InvalidPayload { .. })
        ));

        let foreign = EventInput::new("SomethingElse", Payload::new()).expect("type name is fine");
        assert_eq!(foreign.check::<TestEvent>(), Ok(()));
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if decoding fails
    fn decode_skips_foreign_types() {
        let event = recorded("SomethingElse", Payload::new());
        let decoded = event.decode::<TestEvent>().expect("decode should succeed");
        assert!(decoded.is_none());
    }

    #[test]
    fn decode_reports_malformed_known_types() {
        let mut payload = Payload::new();
        payload.insert("id".to_string(), json!(7));
        let event = recorded("Created", payload);
        assert!(matches!(
            event.decode::<TestEvent>(),
            Err(EventError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn recorded_event_display() {
        let display = format!("{}", recorded("Created", Payload::new()));
        assert_eq!(display, "s#0 @0 Created");
    }
}
