//! Event store test doubles.
//!
//! - [`ConflictingEventStore`]: wraps a real store and rejects the first N
//!   appends with `ConcurrencyConflict`, for exercising retry paths without
//!   racing real tasks.

use foldstream_core::event::{EventInput, RecordedEvent};
use foldstream_core::event_store::{EventStore, EventStoreError, StoreFuture};
use foldstream_core::stream::{GlobalOffset, StreamId, Version};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Store wrapper that injects concurrency conflicts on append.
///
/// Reads always pass through. The first `conflicts` appends fail as if
/// another writer had just appended; later appends pass through. Pass
/// `usize::MAX` to conflict forever.
///
/// # Example
///
/// ```
/// use foldstream_testing::ConflictingEventStore;
/// # use foldstream_core::event_store::EventStore;
/// # use std::sync::Arc;
/// # fn wrap(inner: Arc<dyn EventStore>) {
/// let store = ConflictingEventStore::new(inner, 2);
/// assert_eq!(store.remaining(), 2);
/// # }
/// ```
pub struct ConflictingEventStore {
    inner: Arc<dyn EventStore>,
    remaining: AtomicUsize,
    injected: AtomicUsize,
}

impl ConflictingEventStore {
    /// Wrap `inner`, failing its next `conflicts` appends.
    #[must_use]
    pub fn new(inner: Arc<dyn EventStore>, conflicts: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(conflicts),
            injected: AtomicUsize::new(0),
        }
    }

    /// Conflicts still to be injected.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Conflicts injected so far.
    #[must_use]
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        let taken = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if taken {
            self.injected.fetch_add(1, Ordering::SeqCst);
        }
        taken
    }
}

impl EventStore for ConflictingEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Version,
        events: Vec<EventInput>,
    ) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            if self.take_conflict() {
                let current = self.inner.stream_version(stream_id.clone()).await?;
                return Err(EventStoreError::ConcurrencyConflict {
                    stream_id,
                    expected: expected_version,
                    actual: current.next(),
                });
            }
            self.inner
                .append_events(stream_id, expected_version, events)
                .await
        })
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        from_sequence: Version,
    ) -> StoreFuture<'_, Vec<RecordedEvent>> {
        self.inner.load_events(stream_id, from_sequence)
    }

    fn load_events_strict(
        &self,
        stream_id: StreamId,
        from_sequence: Version,
    ) -> StoreFuture<'_, Vec<RecordedEvent>> {
        self.inner.load_events_strict(stream_id, from_sequence)
    }

    fn load_all(&self, from_offset: GlobalOffset) -> StoreFuture<'_, Vec<RecordedEvent>> {
        self.inner.load_all(from_offset)
    }

    fn stream_version(&self, stream_id: StreamId) -> StoreFuture<'_, Version> {
        self.inner.stream_version(stream_id)
    }
}

impl std::fmt::Debug for ConflictingEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictingEventStore")
            .field("remaining", &self.remaining())
            .field("injected", &self.injected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;
    use std::sync::Mutex;

    /// Counts appends; reports version 0 for everything.
    #[derive(Default)]
    struct CountingStore {
        appends: Mutex<usize>,
    }

    impl EventStore for CountingStore {
        fn append_events(
            &self,
            _stream_id: StreamId,
            expected_version: Version,
            _events: Vec<EventInput>,
        ) -> StoreFuture<'_, Version> {
            *self.appends.lock().unwrap() += 1;
            Box::pin(async move { Ok(expected_version.next()) })
        }

        fn load_events(&self, _: StreamId, _: Version) -> StoreFuture<'_, Vec<RecordedEvent>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn load_events_strict(
            &self,
            stream_id: StreamId,
            _: Version,
        ) -> StoreFuture<'_, Vec<RecordedEvent>> {
            Box::pin(async move { Err(EventStoreError::StreamNotFound(stream_id)) })
        }

        fn load_all(&self, _: GlobalOffset) -> StoreFuture<'_, Vec<RecordedEvent>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn stream_version(&self, _: StreamId) -> StoreFuture<'_, Version> {
            Box::pin(async { Ok(Version::INITIAL) })
        }
    }

    #[tokio::test]
    async fn injects_then_passes_through() {
        let inner = Arc::new(CountingStore::default());
        let store = ConflictingEventStore::new(inner.clone(), 2);

        for _ in 0..2 {
            let err = store
                .append_events(StreamId::new("s"), Version::INITIAL, Vec::new())
                .await
                .unwrap_err();
            assert!(err.is_concurrency_conflict());
        }
        let version = store
            .append_events(StreamId::new("s"), Version::INITIAL, Vec::new())
            .await
            .unwrap();

        assert_eq!(version, Version::new(1));
        assert_eq!(store.injected(), 2);
        assert_eq!(store.remaining(), 0);
        assert_eq!(*inner.appends.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn max_conflicts_forever() {
        let inner = Arc::new(CountingStore::default());
        let store = ConflictingEventStore::new(inner.clone(), usize::MAX);

        for _ in 0..10 {
            assert!(
                store
                    .append_events(StreamId::new("s"), Version::INITIAL, Vec::new())
                    .await
                    .is_err()
            );
        }
        assert_eq!(store.remaining(), usize::MAX);
        assert_eq!(*inner.appends.lock().unwrap(), 0);
    }
}
