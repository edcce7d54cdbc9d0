//! # Foldstream Testing
//!
//! Testing utilities and helpers for foldstream.
//!
//! This crate provides:
//! - Deterministic implementations of environment traits
//! - An event store wrapper that injects concurrency conflicts
//! - Builders for recorded events, for testing projections without a store
//! - proptest strategies for domain values
//!
//! ## Example
//!
//! ```ignore
//! use foldstream_testing::{ConflictingEventStore, test_clock};
//! use foldstream_runtime::{InMemoryEventStore, ProducerRunner};
//!
//! #[tokio::test]
//! async fn retries_through_one_conflict() {
//!     let inner = Arc::new(InMemoryEventStore::with_clock(Arc::new(test_clock())));
//!     let runner = ProducerRunner::new(Arc::new(ConflictingEventStore::new(inner, 1)));
//!
//!     let committed = runner.execute(&producer, &command).await.unwrap();
//!     assert_eq!(committed.attempts, 2);
//! }
//! ```

use chrono::{DateTime, Utc};
use foldstream_core::environment::{Clock, IdGenerator};

mod store_mocks;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use foldstream_testing::mocks::FixedClock;
    /// use foldstream_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// The time this clock reports.
        #[must_use]
        pub const fn time(&self) -> DateTime<Utc> {
            self.time
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable ids: `{prefix}-1`, `{prefix}-2`, ...
    ///
    /// # Example
    ///
    /// ```
    /// use foldstream_testing::mocks::SequentialIdGenerator;
    /// use foldstream_core::environment::IdGenerator;
    ///
    /// let ids = SequentialIdGenerator::new("order");
    /// assert_eq!(ids.next_id(), "order-1");
    /// assert_eq!(ids.next_id(), "order-2");
    /// ```
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Create a generator whose ids start with `prefix`.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl Default for SequentialIdGenerator {
        fn default() -> Self {
            Self::new("id")
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}-{n}", self.prefix)
        }
    }
}

/// Test helpers and utilities.
pub mod helpers {
    use super::{DateTime, Utc};
    use foldstream_core::event::{Event, Payload, RecordedEvent};
    use foldstream_core::stream::{GlobalOffset, StreamId, Version};
    use std::sync::Once;

    /// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
    ///
    /// Output goes through the test writer so it is captured per test.
    pub fn init_tracing() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
                )
                .with_test_writer()
                .try_init();
        });
    }

    /// Builds a run of [`RecordedEvent`]s for one stream, as a store would.
    ///
    /// Sequences and global offsets both count up from where the builder
    /// starts, so the result can be fed straight into a fold.
    ///
    /// # Example
    ///
    /// ```
    /// use foldstream_testing::helpers::RecordedEventBuilder;
    /// use foldstream_core::event::Payload;
    ///
    /// let events = RecordedEventBuilder::new("account-1")
    ///     .raw("Pinged", Payload::new())
    ///     .raw("Pinged", Payload::new())
    ///     .build();
    /// assert_eq!(events[1].sequence.value(), 1);
    /// ```
    #[derive(Debug, Clone)]
    pub struct RecordedEventBuilder {
        stream_id: StreamId,
        next_sequence: Version,
        next_offset: GlobalOffset,
        recorded_at: DateTime<Utc>,
        events: Vec<RecordedEvent>,
    }

    impl RecordedEventBuilder {
        /// Start a builder for `stream_id` at sequence 0, offset 0.
        #[must_use]
        pub fn new(stream_id: impl Into<StreamId>) -> Self {
            Self {
                stream_id: stream_id.into(),
                next_sequence: Version::INITIAL,
                next_offset: GlobalOffset::START,
                recorded_at: super::mocks::test_clock().time(),
                events: Vec::new(),
            }
        }

        /// Continue global offsets from `offset`.
        #[must_use]
        pub const fn starting_at_offset(mut self, offset: GlobalOffset) -> Self {
            self.next_offset = offset;
            self
        }

        /// Append a typed event.
        ///
        /// # Panics
        ///
        /// Panics if the event cannot be encoded.
        #[must_use]
        #[allow(clippy::expect_used)]
        pub fn event<E: Event>(self, event: &E) -> Self {
            let payload = event.to_payload().expect("test event should encode");
            self.raw(event.event_type(), payload)
        }

        /// Append an event from raw parts, unchecked.
        #[must_use]
        pub fn raw(mut self, event_type: &str, payload: Payload) -> Self {
            self.events.push(RecordedEvent {
                stream_id: self.stream_id.clone(),
                sequence: self.next_sequence,
                global_offset: self.next_offset,
                recorded_at: self.recorded_at,
                event_type: event_type.to_string(),
                payload,
            });
            self.next_sequence = self.next_sequence.next();
            self.next_offset = self.next_offset.next();
            self
        }

        /// Finish and return the events.
        #[must_use]
        pub fn build(self) -> Vec<RecordedEvent> {
            self.events
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Non-negative item costs, small enough that sums never overflow.
    pub fn item_cost() -> impl Strategy<Value = i64> {
        0_i64..1_000_000
    }

    /// Non-blank item names.
    pub fn item_name() -> impl Strategy<Value = String> {
        "[a-z][a-z ]{0,15}"
    }
}

// Re-export commonly used items
pub use helpers::{RecordedEventBuilder, init_tracing};
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};
pub use store_mocks::ConflictingEventStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn sequential_ids_are_distinct_and_ordered() {
        let ids = SequentialIdGenerator::default();
        let produced: Vec<String> = (0..3).map(|_| ids.next_id()).collect();
        assert_eq!(produced, vec!["id-1", "id-2", "id-3"]);
    }

    #[test]
    fn builder_continues_offsets() {
        use foldstream_core::event::Payload;
        use foldstream_core::stream::GlobalOffset;

        let events = RecordedEventBuilder::new("s")
            .starting_at_offset(GlobalOffset::new(10))
            .raw("A", Payload::new())
            .raw("B", Payload::new())
            .build();

        assert_eq!(events[0].global_offset, GlobalOffset::new(10));
        assert_eq!(events[1].global_offset, GlobalOffset::new(11));
        assert_eq!(events[1].sequence.value(), 1);
        assert_eq!(events[1].event_type, "B");
    }
}
