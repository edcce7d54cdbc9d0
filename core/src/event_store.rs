//! Event store trait and related types.
//!
//! An event store owns every stream, appends to them under optimistic
//! concurrency control, and serves reads by stream or across the whole store.
//!
//! # Guarantees
//!
//! - Appended events are never removed or changed
//! - Sequence numbers within a stream are contiguous, starting at 0
//! - Global offsets are strictly increasing in append order across all streams
//! - A failed append leaves the store exactly as it was
//!
//! # Example
//!
//! ```no_run
//! use foldstream_core::event_store::{EventStore, EventStoreError};
//! use foldstream_core::stream::{StreamId, Version};
//!
//! async fn example<S: EventStore>(store: &S) -> Result<(), EventStoreError> {
//!     let stream_id = StreamId::new("account-1");
//!
//!     let events = vec![/* EventInput values */];
//!     let new_version = store
//!         .append_events(stream_id.clone(), Version::INITIAL, events)
//!         .await?;
//!
//!     let history = store.load_events(stream_id, Version::INITIAL).await?;
//!     assert_eq!(history.len() as u64, new_version.value());
//!     Ok(())
//! }
//! ```

use crate::event::{EventError, EventInput, RecordedEvent};
use crate::stream::{GlobalOffset, StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EventStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventStoreError>> + Send + 'a>>;

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match current version.
    ///
    /// Another writer appended to the stream after the caller read it. The
    /// caller recovers by re-reading, re-deciding and appending again.
    #[error("Concurrency conflict on {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream ID where the conflict occurred.
        stream_id: StreamId,
        /// The version we expected the stream to be at.
        expected: Version,
        /// The actual current version of the stream.
        actual: Version,
    },

    /// Stream holds no events. Only raised by strict reads.
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Appending would overflow a sequence number or global offset.
    #[error("Position overflow appending to {0}")]
    Overflow(StreamId),

    /// An input failed the store's payload check; nothing was appended.
    #[error("Rejected append: {0}")]
    InvalidPayload(#[from] EventError),
}

impl EventStoreError {
    /// Whether the caller can recover by retrying the read-decide-append cycle.
    #[must_use]
    pub const fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Event store abstraction for appending and reading event streams.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so one store can be shared by many
/// producer and reader tasks.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the store can
/// be held as `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Append events to a stream with optimistic concurrency control.
    ///
    /// The append succeeds only if the stream currently holds exactly
    /// `expected_version` events (0 for a stream that does not exist yet).
    /// Sequence numbers and global offsets are assigned in input order, and
    /// either every event in the batch is persisted or none is.
    ///
    /// An empty batch with a matching version appends nothing and returns the
    /// current version.
    ///
    /// # Returns
    ///
    /// The new stream version. If the stream was at version 5 and 3 events
    /// are appended, returns `Version(8)`.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: version mismatch; the stream is unchanged
    /// - `Overflow`: positions would exceed `u64::MAX`
    /// - `InvalidPayload`: a store that checks payloads rejected an input
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Version,
        events: Vec<EventInput>,
    ) -> StoreFuture<'_, Version>;

    /// Load events from a stream, starting at `from_sequence` (inclusive).
    ///
    /// An absent stream yields an empty vector, not an error: a new stream
    /// simply has no history yet.
    ///
    /// # Errors
    ///
    /// The in-memory store never fails here; the signature leaves room for
    /// backends that can.
    fn load_events(
        &self,
        stream_id: StreamId,
        from_sequence: Version,
    ) -> StoreFuture<'_, Vec<RecordedEvent>>;

    /// Load events from a stream that must already exist.
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` if the stream holds no events.
    fn load_events_strict(
        &self,
        stream_id: StreamId,
        from_sequence: Version,
    ) -> StoreFuture<'_, Vec<RecordedEvent>>;

    /// Load events across all streams in global append order, starting at
    /// `from_offset` (inclusive).
    ///
    /// # Errors
    ///
    /// The in-memory store never fails here.
    fn load_all(&self, from_offset: GlobalOffset) -> StoreFuture<'_, Vec<RecordedEvent>>;

    /// Current version (length) of a stream; `Version::INITIAL` if absent.
    ///
    /// # Errors
    ///
    /// The in-memory store never fails here.
    fn stream_version(&self, stream_id: StreamId) -> StoreFuture<'_, Version>;
}
