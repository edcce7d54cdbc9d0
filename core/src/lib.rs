//! # Foldstream Core
//!
//! Core traits and types for an append-only, multi-stream event store with
//! deterministic projections and consistency-checked producers.
//!
//! ## Core Concepts
//!
//! - **Event**: immutable fact, a type name plus a JSON payload
//! - **Stream**: ordered, append-only history of one aggregate instance
//! - **Event Store**: owns every stream, appends under optimistic concurrency
//! - **Projection**: pure fold `(State, Event) → State`
//! - **Producer**: validates a command against folded state and emits events
//!
//! ## Architecture Principles
//!
//! - Append-only history; nothing is ever rewritten
//! - Pure projections; replay is always safe
//! - Explicit store handles, no ambient global state
//! - Dependencies (time, identifiers) injected via the `environment` traits

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod event;
pub mod event_store;
pub mod producer;
pub mod projection;
pub mod stream;

/// Environment module - Dependency injection traits
///
/// Time and identifier generation are the only non-deterministic inputs in
/// the system. Both sit behind traits so tests can pin them down.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use foldstream_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of fresh aggregate and entity identifiers.
    pub trait IdGenerator: Send + Sync {
        /// Produce an identifier never returned before.
        fn next_id(&self) -> String;
    }

    /// Random 128-bit (UUID v4) identifiers.
    ///
    /// Collision probability is negligible, so concurrent producers never
    /// need to coordinate on ids.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn next_id(&self) -> String {
            uuid::Uuid::new_v4().to_string()
        }
    }
}
