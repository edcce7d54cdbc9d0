//! `Projector`: drives a projection over the event store.
//!
//! The projector reads events through an [`EventStore`] handle and folds
//! them with a [`Projection`], starting either from scratch or from a
//! [`Checkpoint`]. Resuming from a checkpoint reads only the events appended
//! since, which is what keeps large streams cheap to re-project.
//!
//! ```text
//! checkpoint(state, position) ──► load(position..) ──► fold ──► checkpoint'
//! ```
//!
//! # Example
//!
//! ```ignore
//! let projector = Projector::new(CostAggregate, Arc::clone(&store));
//!
//! // Full replay of one stream
//! let checkpoint = projector.project_stream(&stream_id, None).await?;
//!
//! // Later: fold only what was appended since
//! let checkpoint = projector.project_stream(&stream_id, Some(checkpoint)).await?;
//! ```

use crate::metrics::ProjectionMetrics;
use foldstream_core::event_store::EventStore;
use foldstream_core::projection::{Checkpoint, Projection, Result};
use foldstream_core::stream::{GlobalOffset, StreamId, Version};
use std::sync::Arc;

/// Folds a projection over streams or the whole store.
pub struct Projector<P>
where
    P: Projection,
{
    projection: P,
    store: Arc<dyn EventStore>,
}

impl<P> Projector<P>
where
    P: Projection,
{
    /// Create a projector for `projection` reading from `store`.
    #[must_use]
    pub fn new(projection: P, store: Arc<dyn EventStore>) -> Self {
        Self { projection, store }
    }

    /// The projection being driven.
    #[must_use]
    pub const fn projection(&self) -> &P {
        &self.projection
    }

    /// Fold one stream, resuming from `checkpoint` if given.
    ///
    /// An absent stream folds to the checkpoint unchanged (or the initial
    /// state at version 0).
    ///
    /// # Errors
    ///
    /// Returns a [`ProjectionError`](foldstream_core::projection::ProjectionError)
    /// if the read fails or an event cannot be applied.
    pub async fn project_stream(
        &self,
        stream_id: &StreamId,
        checkpoint: Option<Checkpoint<P::State, Version>>,
    ) -> Result<Checkpoint<P::State, Version>> {
        let checkpoint =
            checkpoint.unwrap_or_else(|| Checkpoint::beginning(self.projection.initial_state()));
        let events = self
            .store
            .load_events(stream_id.clone(), checkpoint.position)
            .await?;

        let count = events.len();
        let checkpoint = checkpoint
            .advance(&self.projection, &events)
            .inspect_err(|err| {
                tracing::warn!(
                    projection = self.projection.name(),
                    stream_id = %stream_id,
                    error = %err,
                    "Projection failed"
                );
            })?;

        ProjectionMetrics::record_applied(self.projection.name(), count);
        tracing::trace!(
            projection = self.projection.name(),
            stream_id = %stream_id,
            count,
            position = %checkpoint.position,
            "Projected stream"
        );
        Ok(checkpoint)
    }

    /// Fold the whole store in global order, resuming from `checkpoint` if given.
    ///
    /// # Errors
    ///
    /// Returns a [`ProjectionError`](foldstream_core::projection::ProjectionError)
    /// if the read fails or an event cannot be applied.
    pub async fn project_all(
        &self,
        checkpoint: Option<Checkpoint<P::State, GlobalOffset>>,
    ) -> Result<Checkpoint<P::State, GlobalOffset>> {
        let checkpoint =
            checkpoint.unwrap_or_else(|| Checkpoint::beginning(self.projection.initial_state()));
        let events = self.store.load_all(checkpoint.position).await?;

        let count = events.len();
        let checkpoint = checkpoint
            .advance(&self.projection, &events)
            .inspect_err(|err| {
                tracing::warn!(
                    projection = self.projection.name(),
                    error = %err,
                    "Store-wide projection failed"
                );
            })?;

        ProjectionMetrics::record_applied(self.projection.name(), count);
        tracing::trace!(
            projection = self.projection.name(),
            count,
            position = %checkpoint.position,
            "Projected store"
        );
        Ok(checkpoint)
    }
}
