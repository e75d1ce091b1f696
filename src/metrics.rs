// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for ingest-sinks.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for installing a recorder
//! (Prometheus, OTEL, etc.); without one every call is a no-op.
//!
//! # Metric Naming Convention
//! - `ingest_sinks_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `sink`: the configured sink name
//! - `status`: success, failure
//! - `reason`: count, time, shutdown (batch flushes)
//! - `direction`: grow, shrink (elastic scaling)

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record an accepted or rejected submission
pub fn record_submit(sink: &str, accepted: bool) {
    let status = if accepted { "accepted" } else { "rejected" };
    counter!(
        "ingest_sinks_submissions_total",
        "sink" => sink.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record items handed to the processor, by outcome
pub fn record_processed(sink: &str, count: usize, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "ingest_sinks_items_processed_total",
        "sink" => sink.to_string(),
        "status" => status
    )
    .increment(count as u64);
}

/// Record processor callback latency
pub fn record_process_latency(sink: &str, duration: Duration) {
    histogram!(
        "ingest_sinks_process_seconds",
        "sink" => sink.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a batch flush and its size
pub fn record_flush(sink: &str, reason: &str, count: usize) {
    counter!(
        "ingest_sinks_flushes_total",
        "sink" => sink.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
    histogram!(
        "ingest_sinks_batch_size",
        "sink" => sink.to_string()
    )
    .record(count as f64);
}

/// Record a flush attempt skipped because another flush held the token
pub fn record_flush_skipped(sink: &str, reason: &str) {
    counter!(
        "ingest_sinks_flushes_skipped_total",
        "sink" => sink.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Set current backlog (queue length)
pub fn set_backlog(sink: &str, len: usize) {
    gauge!(
        "ingest_sinks_backlog_items",
        "sink" => sink.to_string()
    )
    .set(len as f64);
}

/// Set current worker count
pub fn set_workers(sink: &str, count: usize) {
    gauge!(
        "ingest_sinks_workers",
        "sink" => sink.to_string()
    )
    .set(count as f64);
}

/// Record an elastic pool resize
pub fn record_scaling(sink: &str, direction: &str) {
    counter!(
        "ingest_sinks_scaling_events_total",
        "sink" => sink.to_string(),
        "direction" => direction.to_string()
    )
    .increment(1);
}

/// Record an error with category for alerting
pub fn record_error(sink: &str, error_type: &str) {
    counter!(
        "ingest_sinks_errors_total",
        "sink" => sink.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record lifecycle transitions
pub fn set_sink_state(sink: &str, state: &str) {
    counter!(
        "ingest_sinks_state_transitions_total",
        "sink" => sink.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record how long complete() took to drain
pub fn record_drain_duration(sink: &str, duration: Duration) {
    histogram!(
        "ingest_sinks_drain_seconds",
        "sink" => sink.to_string()
    )
    .record(duration.as_secs_f64());
}

/// A timing guard that records processor latency on drop
pub struct LatencyTimer<'a> {
    sink: &'a str,
    start: Instant,
}

impl<'a> LatencyTimer<'a> {
    /// Start a new latency timer
    pub fn new(sink: &'a str) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer<'_> {
    fn drop(&mut self) {
        record_process_latency(self.sink, self.start.elapsed());
    }
}
