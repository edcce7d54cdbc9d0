//! Producer runner: read, fold, decide, append, and retry on conflict.
//!
//! # Flow
//!
//! 1. Read the producer's stream (strictly, if the producer requires it).
//! 2. Fold it with the producer's projection; the stream length becomes the
//!    expected version.
//! 3. Ask the producer which events to emit.
//! 4. Append them as one batch under that expected version.
//!
//! If another writer got there first, step 4 fails with
//! `ConcurrencyConflict` and the whole cycle runs again from step 1, up to
//! the policy's attempt limit. Any other error ends the run immediately.

use crate::metrics::ProducerMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use foldstream_core::event::EventInput;
use foldstream_core::event_store::EventStore;
use foldstream_core::producer::{Producer, ProducerError};
use foldstream_core::projection::{Projection, fold};
use foldstream_core::stream::{StreamId, Version};
use std::sync::Arc;

/// Events a producer decided to emit, not yet appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Stream the events belong to.
    pub stream_id: StreamId,
    /// Stream version the decision was made against.
    pub expected_version: Version,
    /// Events to append, in order.
    pub events: Vec<EventInput>,
}

/// Outcome of a successful [`ProducerRunner::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    /// Stream the events were appended to.
    pub stream_id: StreamId,
    /// Stream version after the append.
    pub version: Version,
    /// Events appended, in order.
    pub events: Vec<EventInput>,
    /// Attempts used, first try included.
    pub attempts: usize,
}

/// Runs producers against an event store.
#[derive(Clone)]
pub struct ProducerRunner {
    store: Arc<dyn EventStore>,
    policy: RetryPolicy,
}

impl ProducerRunner {
    /// Create a runner with the default retry policy.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    /// Create a runner with an explicit retry policy.
    #[must_use]
    pub const fn with_policy(store: Arc<dyn EventStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// The store this runner appends to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// The retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Read and fold the producer's stream, then decide. Appends nothing.
    ///
    /// # Errors
    ///
    /// - [`ProducerError::Store`] if the read fails (e.g. `StreamNotFound`)
    /// - [`ProducerError::Projection`] if the stored history cannot be folded
    /// - whatever [`Producer::decide`] returns
    pub async fn decide<P>(
        &self,
        producer: &P,
        command: &P::Command,
    ) -> Result<Decision, ProducerError>
    where
        P: Producer,
    {
        let stream_id = producer.stream_id(command);
        let history = if producer.requires_existing_stream() {
            self.store
                .load_events_strict(stream_id.clone(), Version::INITIAL)
                .await?
        } else {
            self.store
                .load_events(stream_id.clone(), Version::INITIAL)
                .await?
        };

        let expected_version = history
            .last()
            .map_or(Version::INITIAL, |event| event.sequence.next());
        let projection = producer.projection();
        let state = fold(projection, projection.initial_state(), &history)?;
        let events = producer.decide(&state, command)?;

        Ok(Decision {
            stream_id,
            expected_version,
            events,
        })
    }

    /// Decide and append, rerunning the cycle after concurrency conflicts.
    ///
    /// # Errors
    ///
    /// - [`ProducerError::Store`] with `ConcurrencyConflict` once the retry
    ///   policy's attempts are exhausted
    /// - any non-retryable error from [`ProducerRunner::decide`] or the append
    pub async fn execute<P>(
        &self,
        producer: &P,
        command: &P::Command,
    ) -> Result<Committed, ProducerError>
    where
        P: Producer,
    {
        let result = retry_with_predicate(
            &self.policy,
            |attempt| async move {
                if attempt > 0 {
                    ProducerMetrics::record_retry(producer.name());
                }
                let decision = self.decide(producer, command).await?;
                let version = self
                    .store
                    .append_events(
                        decision.stream_id.clone(),
                        decision.expected_version,
                        decision.events.clone(),
                    )
                    .await?;
                Ok(Committed {
                    stream_id: decision.stream_id,
                    version,
                    events: decision.events,
                    attempts: attempt + 1,
                })
            },
            ProducerError::is_retryable,
        )
        .await;

        match &result {
            Ok(committed) => {
                ProducerMetrics::record_command(producer.name(), "committed");
                tracing::debug!(
                    producer = producer.name(),
                    stream_id = %committed.stream_id,
                    version = %committed.version,
                    events = committed.events.len(),
                    attempts = committed.attempts,
                    "Command committed"
                );
            }
            Err(err) if err.is_retryable() => {
                ProducerMetrics::record_command(producer.name(), "conflict");
                tracing::warn!(
                    producer = producer.name(),
                    error = %err,
                    "Command gave up after conflicts"
                );
            }
            Err(err) => {
                ProducerMetrics::record_command(producer.name(), "failed");
                tracing::debug!(producer = producer.name(), error = %err, "Command failed");
            }
        }

        result
    }
}

impl std::fmt::Debug for ProducerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerRunner")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
