//! Metrics for the event store, producers and projector.
//!
//! Metrics go through the `metrics` facade, so they cost nothing until a
//! recorder is installed. [`MetricsRecorder`] installs a Prometheus recorder
//! and can render its current snapshot as text.
//!
//! # Example
//!
//! ```rust,no_run
//! use foldstream_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Handle on an installed Prometheus recorder.
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// If a recorder is already installed (e.g. by another test), the
    /// returned handle renders nothing but metrics keep flowing to the
    /// existing recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    pub fn install() -> Result<Self, MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus metrics recorder installed");
                Ok(Self {
                    handle: Some(handle),
                })
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!(
                        "Metrics recorder already initialized, skipping re-initialization"
                    );
                    Ok(Self { handle: None })
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Event Store Metrics
    describe_counter!(
        "event_store_events_appended_total",
        "Total number of events appended to the event store"
    );
    describe_counter!(
        "event_store_events_loaded_total",
        "Total number of events returned by event store reads"
    );
    describe_counter!(
        "event_store_concurrency_conflicts_total",
        "Total number of appends rejected for a stale expected version"
    );
    describe_histogram!(
        "event_store_append_duration_seconds",
        "Time taken to append a batch of events"
    );

    // Producer Metrics
    describe_counter!(
        "producer_commands_total",
        "Total number of producer commands by outcome"
    );
    describe_counter!(
        "producer_retries_total",
        "Total number of decide-append cycles rerun after a conflict"
    );

    // Projection Metrics
    describe_counter!(
        "projection_events_applied_total",
        "Total number of events folded by the projector"
    );
}

/// Event store metrics recorder.
pub struct EventStoreMetrics;

impl EventStoreMetrics {
    /// Record an event append operation.
    pub fn record_append(count: usize, duration: Duration) {
        counter!("event_store_events_appended_total").increment(count as u64);
        histogram!("event_store_append_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an event load operation.
    pub fn record_load(count: usize) {
        counter!("event_store_events_loaded_total").increment(count as u64);
    }

    /// Record an append rejected by the version check.
    pub fn record_conflict() {
        counter!("event_store_concurrency_conflicts_total").increment(1);
    }
}

/// Producer metrics recorder.
pub struct ProducerMetrics;

impl ProducerMetrics {
    /// Record a finished command.
    pub fn record_command(producer: &'static str, outcome: &'static str) {
        counter!("producer_commands_total", "producer" => producer, "outcome" => outcome)
            .increment(1);
    }

    /// Record a retry after a conflict.
    pub fn record_retry(producer: &'static str) {
        counter!("producer_retries_total", "producer" => producer).increment(1);
    }
}

/// Projection metrics recorder.
pub struct ProjectionMetrics;

impl ProjectionMetrics {
    /// Record events folded by a projection.
    pub fn record_applied(projection: &'static str, count: usize) {
        counter!("projection_events_applied_total", "projection" => projection)
            .increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;

    #[test]
    fn install_and_render() {
        let recorder = MetricsRecorder::install().unwrap();

        EventStoreMetrics::record_append(5, Duration::from_micros(40));
        EventStoreMetrics::record_conflict();
        ProducerMetrics::record_command("add_item", "committed");

        // Another test may have installed the recorder first; metrics are still recorded.
        if let Some(rendered) = recorder.render() {
            assert!(rendered.contains("event_store_events_appended_total"));
            assert!(rendered.contains("event_store_concurrency_conflicts_total"));
            assert!(rendered.contains("producer_commands_total"));
        }
    }

    #[test]
    fn second_install_is_tolerated() {
        let _first = MetricsRecorder::install().unwrap();
        let second = MetricsRecorder::install().unwrap();
        assert!(second.handle().is_none());
    }
}
