//! # Foldstream Runtime
//!
//! Runtime pieces for the foldstream event-sourcing model.
//!
//! ## Core Components
//!
//! - **`InMemoryEventStore`**: append-only streams plus one global log, with
//!   optimistic concurrency on append
//! - **`Projector`**: folds a projection over a stream or the whole store,
//!   resuming from checkpoints
//! - **`ProducerRunner`**: read → fold → decide → append, rerun on conflict
//! - **Retry, config and metrics** support for the above
//!
//! ## Example
//!
//! ```ignore
//! use foldstream_runtime::{InMemoryEventStore, ProducerRunner};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryEventStore::new());
//! let runner = ProducerRunner::new(store.clone());
//!
//! let committed = runner.execute(&add_item, &command).await?;
//! println!("stream now at {}", committed.version);
//! ```

/// Environment-driven configuration
pub mod config;

/// In-memory event store
pub mod event_store;

/// Prometheus metrics for observability
pub mod metrics;

/// Producer runner with optimistic retry
pub mod producer;

/// Projection driver with checkpoints
pub mod projector;

/// Retry logic with exponential backoff
pub mod retry;

pub use config::{ConfigError, ProducerConfig};
pub use event_store::InMemoryEventStore;
pub use producer::{Committed, Decision, ProducerRunner};
pub use projector::Projector;
pub use retry::{RetryPolicy, retry_with_predicate};
