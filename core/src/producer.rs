//! Producers: the write-side decision step.
//!
//! A producer turns a command into new events, but only after checking the
//! command against the current state of its stream. The runtime handles the
//! read-fold-append loop; a producer only says which stream it works on and
//! what to emit given a folded state.
//!
//! ```text
//! command ──► stream_id ──► load + fold ──► decide ──► append(expected_version)
//!                                  ▲                          │
//!                                  └──── ConcurrencyConflict ─┘
//! ```

use crate::event::{EventError, EventInput};
use crate::event_store::EventStoreError;
use crate::projection::{Projection, ProjectionError};
use crate::stream::StreamId;
use thiserror::Error;

/// Errors a producer run can end with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProducerError {
    /// The command is not valid against the current state.
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// The command would produce a malformed event.
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] EventError),

    /// Folding the stream failed; the stored history is inconsistent.
    #[error("Projection failed: {0}")]
    Projection(#[from] ProjectionError),

    /// Reading or appending failed.
    #[error("Store error: {0}")]
    Store(#[from] EventStoreError),
}

impl ProducerError {
    /// Only concurrency conflicts are worth a fresh read-decide-append cycle.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(EventStoreError::ConcurrencyConflict { .. }))
    }
}

/// Decides which events a command produces.
///
/// `decide` sees a state folded from the whole stream and must be free of
/// side effects other than drawing fresh identifiers, because it can run once
/// per retry.
pub trait Producer: Send + Sync {
    /// Projection used to build the decision state.
    type Projection: Projection;

    /// Command input.
    type Command: Send + Sync;

    /// Producer name for logs and metrics.
    fn name(&self) -> &'static str;

    /// The projection instance to fold with.
    fn projection(&self) -> &Self::Projection;

    /// Stream the command reads and appends to.
    fn stream_id(&self, command: &Self::Command) -> StreamId;

    /// Whether the stream must already hold events.
    ///
    /// When `true` the runtime uses a strict read, so a missing stream fails
    /// with `StreamNotFound` instead of folding an empty history.
    fn requires_existing_stream(&self) -> bool {
        false
    }

    /// Decide which events to emit, in order.
    ///
    /// # Errors
    ///
    /// - [`ProducerError::Rejected`] if the command is invalid for this state
    /// - [`ProducerError::InvalidPayload`] if the command carries bad data
    fn decide(
        &self,
        state: &<Self::Projection as Projection>::State,
        command: &Self::Command,
    ) -> Result<Vec<EventInput>, ProducerError>;
}
