// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Outcome bookkeeping: counters, callback failure routing, join faults.
//!
//! A processor failure never stops a worker. It is logged, counted, and
//! forwarded to the failure channel if the caller attached one.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{error, warn};

use crate::error::{ProcessError, SinkError};

use super::CompletionSummary;

pub(crate) struct Outcomes {
    sink: String,
    submitted: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    batches: AtomicU64,
    worker_faults: AtomicUsize,
    failures: RwLock<Option<mpsc::UnboundedSender<SinkError>>>,
}

impl Outcomes {
    pub(crate) fn new(sink: &str) -> Self {
        Self {
            sink: sink.to_string(),
            submitted: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            worker_faults: AtomicUsize::new(0),
            failures: RwLock::new(None),
        }
    }

    pub(crate) fn sink(&self) -> &str {
        &self.sink
    }

    pub(crate) fn attach(&self, tx: mpsc::UnboundedSender<SinkError>) {
        *self.failures.write() = Some(tx);
    }

    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for one processor call covering `count` items.
    pub(crate) fn observe(&self, count: usize, result: Result<(), ProcessError>) {
        match result {
            Ok(()) => {
                self.processed.fetch_add(count as u64, Ordering::Relaxed);
                crate::metrics::record_processed(&self.sink, count, true);
            }
            Err(source) => {
                self.failed.fetch_add(count as u64, Ordering::Relaxed);
                crate::metrics::record_processed(&self.sink, count, false);
                warn!(sink = %self.sink, items = count, error = %source, "Processor failed, continuing");
                self.report(SinkError::Callback {
                    sink: self.sink.clone(),
                    source,
                });
            }
        }
    }

    /// Account for a worker task that could not be joined cleanly.
    pub(crate) fn observe_join(&self, joined: Result<(), JoinError>) {
        let Err(e) = joined else { return };
        self.worker_faults.fetch_add(1, Ordering::Relaxed);
        error!(sink = %self.sink, error = %e, "Worker terminated abnormally");
        self.report(SinkError::WorkerPanicked {
            sink: self.sink.clone(),
            reason: e.to_string(),
        });
    }

    fn report(&self, err: SinkError) {
        crate::metrics::record_error(&self.sink, err.kind());
        if let Some(tx) = self.failures.read().as_ref() {
            // Receiver dropped: the caller stopped listening, logs still have it.
            let _ = tx.send(err);
        }
    }

    pub(crate) fn summary(&self, drain_time: Duration) -> CompletionSummary {
        CompletionSummary {
            submitted: self.submitted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            worker_faults: self.worker_faults.load(Ordering::Relaxed),
            drain_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_success_and_failure() {
        let outcomes = Outcomes::new("test");
        for _ in 0..3 {
            outcomes.record_submitted();
        }
        outcomes.observe(2, Ok(()));
        outcomes.observe(1, Err(ProcessError::new("nope")));

        let summary = outcomes.summary(Duration::ZERO);
        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.fully_drained());
    }

    #[test]
    fn test_failures_forwarded_to_channel() {
        let outcomes = Outcomes::new("orders");
        let (tx, mut rx) = mpsc::unbounded_channel();
        outcomes.attach(tx);

        outcomes.observe(1, Err(ProcessError::new("bad record")));
        outcomes.observe(1, Ok(()));

        let err = rx.try_recv().unwrap();
        assert_eq!(
            err,
            SinkError::Callback {
                sink: "orders".into(),
                source: ProcessError::new("bad record"),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let outcomes = Outcomes::new("orders");
        let (tx, rx) = mpsc::unbounded_channel();
        outcomes.attach(tx);
        drop(rx);
        outcomes.observe(1, Err(ProcessError::new("ignored")));
        assert_eq!(outcomes.summary(Duration::ZERO).failed, 1);
    }

    #[tokio::test]
    async fn test_panicked_worker_is_reported() {
        let outcomes = Outcomes::new("pool");
        let (tx, mut rx) = mpsc::unbounded_channel();
        outcomes.attach(tx);

        let handle = tokio::spawn(async { panic!("worker blew up") });
        outcomes.observe_join(handle.await);
        outcomes.observe_join(Ok(()));

        assert_eq!(outcomes.summary(Duration::ZERO).worker_faults, 1);
        assert!(matches!(rx.try_recv(), Ok(SinkError::WorkerPanicked { .. })));
    }
}
