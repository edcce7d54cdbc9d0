//! In-memory event store.
//!
//! # Layout
//!
//! ```text
//! streams: RwLock<HashMap<StreamId, Arc<RwLock<Vec<Arc<RecordedEvent>>>>>>
//! log:     RwLock<GlobalLog { events: Vec<Arc<RecordedEvent>>, last_recorded_at }>
//! ```
//!
//! Each recorded event is shared between its stream and the global log.
//!
//! # Locking
//!
//! - The stream map lock is held only to look up or create a stream slot.
//!   A slot is created only for an append that can succeed on a new stream.
//! - An append takes its stream's write lock, so appends to the same stream
//!   are serialized and appends to different streams validate independently.
//! - While still holding the stream lock, the append takes the log lock just
//!   long enough to assign offsets and push. Lock order is always
//!   stream → log.
//! - Both pushes happen under both locks, so no reader of either structure
//!   sees an event the other does not have yet.
//! - Readers copy the `Arc`s out under the lock and clone the events after
//!   releasing it.
//!
//! # Payload checks
//!
//! A store built with [`InMemoryEventStore::validating`] decodes every input
//! of a known type before taking any lock, and rejects the whole batch with
//! `InvalidPayload` if one fails. Events that reach the log always fold.

use crate::metrics::EventStoreMetrics;
use chrono::{DateTime, Utc};
use foldstream_core::environment::{Clock, SystemClock};
use foldstream_core::event::{Event, EventError, EventInput, RecordedEvent};
use foldstream_core::event_store::{EventStore, EventStoreError, StoreFuture};
use foldstream_core::stream::{GlobalOffset, StreamId, Version};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

type StreamSlot = Arc<RwLock<Vec<Arc<RecordedEvent>>>>;

type PayloadCheck = fn(&EventInput) -> Result<(), EventError>;

#[derive(Default)]
struct GlobalLog {
    events: Vec<Arc<RecordedEvent>>,
    last_recorded_at: Option<DateTime<Utc>>,
}

impl GlobalLog {
    /// Clock reading clamped so timestamps never go backwards along the log.
    fn stamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let stamped = self.last_recorded_at.map_or(now, |last| last.max(now));
        self.last_recorded_at = Some(stamped);
        stamped
    }
}

/// Event store keeping every stream in memory.
///
/// Cheap to share: wrap it in an `Arc` (or `Arc<dyn EventStore>`) and hand
/// clones of the handle to every producer and reader.
///
/// # Example
///
/// ```
/// use foldstream_core::event::{EventInput, Payload};
/// use foldstream_core::event_store::EventStore;
/// use foldstream_core::stream::{StreamId, Version};
/// use foldstream_runtime::InMemoryEventStore;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryEventStore::new();
/// let input = EventInput::new("Pinged", Payload::new()).unwrap();
///
/// let version = store
///     .append_events(StreamId::new("ping"), Version::INITIAL, vec![input])
///     .await
///     .unwrap();
/// assert_eq!(version, Version::new(1));
/// # });
/// ```
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamId, StreamSlot>>,
    log: RwLock<GlobalLog>,
    clock: Arc<dyn Clock>,
    check: Option<PayloadCheck>,
}

impl InMemoryEventStore {
    /// Create an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping events with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            log: RwLock::new(GlobalLog::default()),
            clock,
            check: None,
        }
    }

    /// Reject appends whose inputs of a type `E` defines do not decode as `E`.
    ///
    /// Other event types are stored unchecked.
    #[must_use]
    pub fn validating<E: Event>(mut self) -> Self {
        self.check = Some(EventInput::check::<E>);
        self
    }

    /// Total number of events across all streams.
    pub async fn len(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Whether no event has been appended yet.
    pub async fn is_empty(&self) -> bool {
        self.log.read().await.events.is_empty()
    }

    /// Identifiers of every stream holding at least one event, sorted.
    pub async fn stream_ids(&self) -> Vec<StreamId> {
        let slots: Vec<(StreamId, StreamSlot)> = self
            .streams
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();

        let mut ids = Vec::with_capacity(slots.len());
        for (id, slot) in slots {
            if !slot.read().await.is_empty() {
                ids.push(id);
            }
        }
        ids.sort();
        ids
    }

    async fn slot(&self, stream_id: &StreamId) -> Option<StreamSlot> {
        self.streams.read().await.get(stream_id).cloned()
    }

    /// Existing slot, or a new one when an append of `events` at
    /// `expected_version` could succeed on an absent stream.
    async fn slot_for_append(
        &self,
        stream_id: &StreamId,
        expected_version: Version,
        events: &[EventInput],
    ) -> Option<StreamSlot> {
        if let Some(slot) = self.slot(stream_id).await {
            return Some(slot);
        }
        if !expected_version.is_initial() || events.is_empty() {
            return None;
        }
        let mut streams = self.streams.write().await;
        Some(Arc::clone(streams.entry(stream_id.clone()).or_default()))
    }

    fn check_version(
        stream_id: &StreamId,
        expected_version: Version,
        actual: Version,
    ) -> Result<(), EventStoreError> {
        if actual == expected_version {
            return Ok(());
        }
        EventStoreMetrics::record_conflict();
        tracing::debug!(
            stream_id = %stream_id,
            expected = %expected_version,
            actual = %actual,
            "Rejected append: stale expected version"
        );
        Err(EventStoreError::ConcurrencyConflict {
            stream_id: stream_id.clone(),
            expected: expected_version,
            actual,
        })
    }

    async fn append(
        &self,
        stream_id: StreamId,
        expected_version: Version,
        events: Vec<EventInput>,
    ) -> Result<Version, EventStoreError> {
        let started = Instant::now();
        if let Some(check) = self.check {
            events.iter().try_for_each(check).map_err(|err| {
                tracing::warn!(
                    stream_id = %stream_id,
                    error = %err,
                    "Rejected append: invalid payload"
                );
                EventStoreError::from(err)
            })?;
        }

        let Some(slot) = self
            .slot_for_append(&stream_id, expected_version, &events)
            .await
        else {
            Self::check_version(&stream_id, expected_version, Version::INITIAL)?;
            return Ok(Version::INITIAL);
        };
        let mut stream = slot.write().await;

        let actual = Version::new(stream.len() as u64);
        Self::check_version(&stream_id, expected_version, actual)?;

        if events.is_empty() {
            return Ok(actual);
        }

        let count = events.len() as u64;
        let new_version = actual
            .checked_add(count)
            .ok_or_else(|| EventStoreError::Overflow(stream_id.clone()))?;

        let mut log = self.log.write().await;
        let first_offset = GlobalOffset::new(log.events.len() as u64);
        if first_offset.checked_add(count).is_none() {
            return Err(EventStoreError::Overflow(stream_id));
        }
        let recorded_at = log.stamp(self.clock.now());

        // Build the whole batch before touching either vector.
        let batch: Vec<Arc<RecordedEvent>> = events
            .into_iter()
            .zip(0_u64..)
            .map(|(input, index)| {
                let (event_type, payload) = input.into_parts();
                Arc::new(RecordedEvent {
                    stream_id: stream_id.clone(),
                    sequence: Version::new(actual.value() + index),
                    global_offset: GlobalOffset::new(first_offset.value() + index),
                    recorded_at,
                    event_type,
                    payload,
                })
            })
            .collect();

        let batch_len = batch.len();
        log.events.extend(batch.iter().cloned());
        stream.extend(batch);
        drop(log);
        drop(stream);

        EventStoreMetrics::record_append(batch_len, started.elapsed());
        tracing::debug!(
            stream_id = %stream_id,
            count,
            version = %new_version,
            first_offset = %first_offset,
            "Appended events"
        );

        Ok(new_version)
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        from_sequence: Version,
    ) -> Option<Vec<RecordedEvent>> {
        let slot = self.slot(stream_id).await?;
        let stream = slot.read().await;
        if stream.is_empty() {
            return None;
        }
        let start = usize::try_from(from_sequence.value()).unwrap_or(usize::MAX);
        let shared = stream.get(start..).unwrap_or_default().to_vec();
        drop(stream);

        let events = unshare(shared);
        EventStoreMetrics::record_load(events.len());
        Some(events)
    }
}

fn unshare(shared: Vec<Arc<RecordedEvent>>) -> Vec<RecordedEvent> {
    shared
        .into_iter()
        .map(Arc::unwrap_or_clone)
        .collect()
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore").finish_non_exhaustive()
    }
}

impl EventStore for InMemoryEventStore {
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Version,
        events: Vec<EventInput>,
    ) -> StoreFuture<'_, Version> {
        Box::pin(self.append(stream_id, expected_version, events))
    }

    fn load_events(
        &self,
        stream_id: StreamId,
        from_sequence: Version,
    ) -> StoreFuture<'_, Vec<RecordedEvent>> {
        Box::pin(async move {
            Ok(self
                .read_stream(&stream_id, from_sequence)
                .await
                .unwrap_or_default())
        })
    }

    fn load_events_strict(
        &self,
        stream_id: StreamId,
        from_sequence: Version,
    ) -> StoreFuture<'_, Vec<RecordedEvent>> {
        Box::pin(async move {
            self.read_stream(&stream_id, from_sequence)
                .await
                .ok_or(EventStoreError::StreamNotFound(stream_id))
        })
    }

    fn load_all(&self, from_offset: GlobalOffset) -> StoreFuture<'_, Vec<RecordedEvent>> {
        Box::pin(async move {
            let log = self.log.read().await;
            let start = usize::try_from(from_offset.value()).unwrap_or(usize::MAX);
            let shared = log.events.get(start..).unwrap_or_default().to_vec();
            drop(log);

            let events = unshare(shared);
            EventStoreMetrics::record_load(events.len());
            Ok(events)
        })
    }

    fn stream_version(&self, stream_id: StreamId) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let Some(slot) = self.slot(&stream_id).await else {
                return Ok(Version::INITIAL);
            };
            let len = slot.read().await.len();
            Ok(Version::new(len as u64))
        })
    }
}
