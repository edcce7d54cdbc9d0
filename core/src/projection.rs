//! Projections: pure folds from an event sequence to a derived state.
//!
//! # Overview
//!
//! A projection is a function `(state, event) -> state'` with no side
//! effects. Folding it left over an ordered event sequence yields a read
//! model. Because `apply` depends on nothing but its arguments, replaying the
//! same events always produces the same state, and a fold can be split at any
//! point:
//!
//! ```text
//! fold(p, fold(p, s0, events[..k]), events[k..]) == fold(p, s0, events)
//! ```
//!
//! That identity is what makes [`Checkpoint`]s work: keep the state and the
//! next position to read, and later fold only what was appended since.
//!
//! # Ownership
//!
//! `apply` takes the state by value and returns the next one. A projection
//! never edits an entity in place while something else is looking at it; the
//! previous state is simply consumed.

use crate::event::{Event, EventError, RecordedEvent};
use crate::event_store::EventStoreError;
use crate::stream::{GlobalOffset, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for projection operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    /// An event refers to an aggregate (or child entity) the state has never seen.
    ///
    /// This is a data-integrity failure: the event history is inconsistent.
    #[error("Orphan event {event_type}: no aggregate {aggregate_id}")]
    OrphanEvent {
        /// Type of the offending event.
        event_type: String,
        /// Identifier that could not be resolved.
        aggregate_id: String,
    },

    /// A creation event for an aggregate that already exists.
    #[error("Duplicate aggregate {aggregate_id} created by {event_type}")]
    DuplicateAggregate {
        /// Type of the offending event.
        event_type: String,
        /// Identifier that was already present.
        aggregate_id: String,
    },

    /// An event of a known type carried a malformed payload.
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] EventError),

    /// A seed state was supplied for a different projection.
    #[error("State mismatch: expected {expected} state, found {found}")]
    StateMismatch {
        /// Projection being folded.
        expected: String,
        /// Projection the seed state belongs to.
        found: String,
    },

    /// Reading events for the projection failed.
    #[error("Store error: {0}")]
    Store(#[from] EventStoreError),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// A pure fold function deriving state from events.
///
/// # Determinism
///
/// `apply` must depend only on its arguments. No clocks, no randomness, no
/// I/O. Folding the same state/event pair twice must give equal results.
pub trait Projection: Send + Sync {
    /// Typed event enum this projection understands.
    type Event: Event;

    /// Derived state.
    type State: Clone + Send + Sync;

    /// Projection name, used in logs and named folds.
    fn name(&self) -> &'static str;

    /// State before any event has been applied.
    fn initial_state(&self) -> Self::State;

    /// Apply one event to a state, returning the next state.
    ///
    /// # Errors
    ///
    /// - [`ProjectionError::OrphanEvent`] if the event references a missing aggregate
    /// - [`ProjectionError::DuplicateAggregate`] if it re-creates an existing one
    fn apply(&self, state: Self::State, event: &Self::Event) -> Result<Self::State>;
}

/// Strict left fold of `projection` over `events`, starting at `initial`.
///
/// Events whose type the projection's event enum does not know are skipped.
///
/// # Errors
///
/// Returns the first error raised by decoding or by [`Projection::apply`].
///
/// # Example
///
/// ```ignore
/// let state = fold(&CostAggregate, CostAggregate.initial_state(), &events)?;
/// ```
pub fn fold<'a, P, I>(projection: &P, initial: P::State, events: I) -> Result<P::State>
where
    P: Projection + ?Sized,
    I: IntoIterator<Item = &'a RecordedEvent>,
{
    events.into_iter().try_fold(initial, |state, recorded| {
        match recorded.decode::<P::Event>()? {
            Some(event) => projection.apply(state, &event),
            None => Ok(state),
        }
    })
}

/// A position that can be derived from the last event folded.
pub trait Position: Copy + Default + Ord + Send + Sync {
    /// Position of the first event not yet covered once `event` has been folded.
    fn after(event: &RecordedEvent) -> Self;
}

impl Position for Version {
    fn after(event: &RecordedEvent) -> Self {
        event.sequence.next()
    }
}

impl Position for GlobalOffset {
    fn after(event: &RecordedEvent) -> Self {
        event.global_offset.next()
    }
}

/// A folded state paired with the next position to read.
///
/// Use `Checkpoint<S, Version>` for single-stream folds and
/// `Checkpoint<S, GlobalOffset>` for store-wide folds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint<S, P = GlobalOffset> {
    /// State after folding everything before `position`.
    pub state: S,
    /// First position not yet folded.
    pub position: P,
}

impl<S, P: Position> Checkpoint<S, P> {
    /// Create a checkpoint.
    #[must_use]
    pub const fn new(state: S, position: P) -> Self {
        Self { state, position }
    }

    /// A checkpoint at the very beginning.
    #[must_use]
    pub fn beginning(state: S) -> Self {
        Self {
            state,
            position: P::default(),
        }
    }

    /// Fold `events` on top of this checkpoint and move the position past them.
    ///
    /// `events` must start at `self.position`; the caller reads them from there.
    ///
    /// # Errors
    ///
    /// Same as [`fold`]. On error the original checkpoint is consumed; the
    /// caller still holds whatever it persisted before.
    pub fn advance<Proj>(self, projection: &Proj, events: &[RecordedEvent]) -> Result<Self>
    where
        Proj: Projection<State = S> + ?Sized,
    {
        let position = events.last().map_or(self.position, P::after);
        let state = fold(projection, self.state, events)?;
        Ok(Self { state, position })
    }
}
