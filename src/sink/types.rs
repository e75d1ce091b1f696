//! Public types for the sink contract.

use std::time::Duration;

/// Sink lifecycle state.
///
/// ```text
/// Running → Completing → Completed
/// ```
///
/// Only `complete()` leaves `Running`. Use
/// [`DataSink::state_receiver()`](super::DataSink::state_receiver) to watch
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Accepting submissions
    Running,
    /// Submissions rejected, queue draining, workers winding down
    Completing,
    /// Terminal: no workers, empty queue
    Completed,
}

impl std::fmt::Display for SinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Completing => write!(f, "Completing"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// What a sink did over its lifetime, returned by `complete()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSummary {
    /// Items accepted by `submit`
    pub submitted: u64,
    /// Items whose processor call returned `Ok`
    pub processed: u64,
    /// Items whose processor call returned `Err` (a failed batch counts every item)
    pub failed: u64,
    /// Batches flushed (Batch sink only, zero elsewhere)
    pub batches: u64,
    /// Worker tasks that terminated abnormally
    pub worker_faults: usize,
    /// Time spent inside `complete()`
    pub drain_time: Duration,
}

impl CompletionSummary {
    /// Every accepted item reached the processor.
    #[must_use]
    pub fn fully_drained(&self) -> bool {
        self.processed + self.failed == self.submitted
    }
}

impl std::fmt::Display for CompletionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "submitted={} processed={} failed={} batches={} worker_faults={} drain={:?}",
            self.submitted, self.processed, self.failed, self.batches, self.worker_faults, self.drain_time
        )
    }
}
