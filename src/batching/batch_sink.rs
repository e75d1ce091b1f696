// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batching sink: flushes on item count or elapsed time, whichever first.
//!
//! Two triggers compete for a single-slot flush token:
//!
//! - `submit` tries to flush inline once the queue holds `batch_size` items
//! - a timer task tries to flush every `time_limit`
//!
//! A trigger that finds the token taken does nothing; the items stay queued
//! for the next trigger. `complete()` stops the timer, then keeps acquiring
//! the token (waiting this time) and flushing until the queue is empty.
//!
//! # Example
//!
//! ```
//! use ingest_sinks::{BatchingSink, BatchSinkConfig, DataSink, ProcessError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ingest_sinks::SinkError> {
//! let config = BatchSinkConfig { batch_size: 5, time_limit_ms: 10_000, ..Default::default() };
//! let sink = BatchingSink::new(config, |batch: Vec<String>| async move {
//!     assert!(batch.len() <= 5);
//!     Ok::<(), ProcessError>(())
//! })?;
//!
//! for i in 0..12 {
//!     sink.submit(format!("item{i}")).await?;
//! }
//! let summary = sink.complete().await?;
//! assert_eq!(summary.processed, 12);
//! assert_eq!(summary.batches, 3);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::BatchSinkConfig;
use crate::error::SinkError;
use crate::metrics::LatencyTimer;
use crate::processor::{guarded, BatchProcessor};
use crate::queue::SinkQueue;
use crate::sink::lifecycle::Lifecycle;
use crate::sink::report::Outcomes;
use crate::sink::{CompletionSummary, DataSink, SinkState};

use super::FlushReason;

pub struct BatchingSink<T: Send + 'static> {
    inner: Arc<BatchInner<T>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    timer_stop: CancellationToken,
}

struct BatchInner<T> {
    config: BatchSinkConfig,
    queue: SinkQueue<T>,
    processor: Arc<dyn BatchProcessor<T>>,
    /// One permit: at most one flush in flight.
    flush_token: Semaphore,
    lifecycle: Lifecycle,
    outcomes: Outcomes,
}

impl<T: Send + 'static> BatchingSink<T> {
    /// Create the sink and start its flush timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: BatchSinkConfig,
        processor: impl BatchProcessor<T>,
    ) -> Result<Self, SinkError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SinkError::invalid("BatchingSink must be created inside a tokio runtime"))?;

        let inner = Arc::new(BatchInner {
            queue: SinkQueue::new(),
            processor: Arc::new(processor),
            flush_token: Semaphore::new(1),
            lifecycle: Lifecycle::new(&config.name),
            outcomes: Outcomes::new(&config.name),
            config,
        });

        let timer_stop = CancellationToken::new();
        let timer = runtime.spawn(run_timer(inner.clone(), timer_stop.clone()));

        info!(
            sink = %inner.config.name,
            batch_size = inner.config.batch_size,
            time_limit_ms = inner.config.time_limit_ms,
            "Batching sink started"
        );

        Ok(Self {
            inner,
            timer: Mutex::new(Some(timer)),
            timer_stop,
        })
    }

    /// Forward processor failures to `tx` in addition to logging them.
    #[must_use]
    pub fn with_failure_channel(self, tx: mpsc::UnboundedSender<SinkError>) -> Self {
        self.inner.outcomes.attach(tx);
        self
    }

    #[must_use]
    pub fn config(&self) -> &BatchSinkConfig {
        &self.inner.config
    }
}

impl<T: Send + 'static> BatchInner<T> {
    /// Flush if no other flush is running; otherwise leave items queued.
    async fn try_flush(&self, reason: FlushReason) -> usize {
        let Ok(_token) = self.flush_token.try_acquire() else {
            debug!(sink = %self.config.name, reason = %reason, "Flush already in progress, skipping");
            crate::metrics::record_flush_skipped(&self.config.name, reason.as_str());
            return 0;
        };
        self.flush_holding_token(reason).await
    }

    /// Drain up to `batch_size` items into one batch and process it.
    /// Caller must hold the flush token.
    async fn flush_holding_token(&self, reason: FlushReason) -> usize {
        let batch = self.queue.pop_up_to(self.config.batch_size);
        crate::metrics::set_backlog(&self.config.name, self.queue.len());
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        debug!(sink = %self.config.name, batch_size = count, reason = %reason, "Flushing batch");
        crate::metrics::record_flush(&self.config.name, reason.as_str(), count);
        self.outcomes.record_batch();

        let result = {
            let _timer = LatencyTimer::new(&self.config.name);
            guarded(self.processor.process_batch(batch)).await
        };
        self.outcomes.observe(count, result);
        count
    }
}

async fn run_timer<T: Send + 'static>(inner: Arc<BatchInner<T>>, stop: CancellationToken) {
    let period = inner.config.time_limit();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                inner.try_flush(FlushReason::Time).await;
            }
        }
    }
    debug!(sink = %inner.config.name, "Flush timer stopped");
}

#[async_trait]
impl<T: Send + 'static> DataSink<T> for BatchingSink<T> {
    async fn submit(&self, item: T) -> Result<(), SinkError> {
        let inner = &self.inner;
        let backlog = inner.lifecycle.admit(|| {
            inner.outcomes.record_submitted();
            inner.queue.push(item)
        })?;
        crate::metrics::set_backlog(&inner.config.name, backlog);

        if backlog >= inner.config.batch_size {
            inner.try_flush(FlushReason::Count).await;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(sink = %self.inner.config.name))]
    async fn complete(&self) -> Result<CompletionSummary, SinkError> {
        let started = Instant::now();
        self.inner.lifecycle.begin_completion()?;

        self.timer_stop.cancel();
        let timer = self.timer.lock().take();
        if let Some(handle) = timer {
            self.inner.outcomes.observe_join(handle.await);
        }

        // A single flush may not empty the queue, and a submit-triggered
        // flush may still be running: wait for the token every round.
        loop {
            let Ok(_token) = self.inner.flush_token.acquire().await else {
                break;
            };
            if self.inner.flush_holding_token(FlushReason::Shutdown).await == 0 {
                break;
            }
        }

        self.inner.lifecycle.finish();
        let drain_time = started.elapsed();
        crate::metrics::record_drain_duration(&self.inner.config.name, drain_time);
        let summary = self.inner.outcomes.summary(drain_time);
        info!(sink = %self.inner.config.name, %summary, "Batching sink completed");
        Ok(summary)
    }

    fn state(&self) -> SinkState {
        self.inner.lifecycle.state()
    }

    fn state_receiver(&self) -> watch::Receiver<SinkState> {
        self.inner.lifecycle.subscribe()
    }

    fn backlog(&self) -> usize {
        self.inner.queue.len()
    }

    fn name(&self) -> &str {
        self.inner.outcomes.sink()
    }
}

impl<T: Send + 'static> Drop for BatchingSink<T> {
    fn drop(&mut self) {
        // Dropped without complete(): stop the timer so it does not outlive us.
        self.timer_stop.cancel();
    }
}
