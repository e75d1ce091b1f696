// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Paced sink: one worker, a fixed delay before every item.
//!
//! The worker is spawned lazily by the first `submit` and is the only one the
//! sink ever has, so items are processed strictly in submission order. It
//! keeps running while the sink is `Running` or the queue is non-empty, which
//! means it finishes the backlog before exiting after `complete()`.
//!
//! # Example
//!
//! ```
//! use ingest_sinks::{DataSink, PacedSink, PacedSinkConfig, ProcessError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ingest_sinks::SinkError> {
//! let config = PacedSinkConfig { delay_ms: 5, ..Default::default() };
//! let sink = PacedSink::new(config, |line: String| async move {
//!     println!("{line}");
//!     Ok::<(), ProcessError>(())
//! })?;
//!
//! sink.submit("first".to_string()).await?;
//! sink.submit("second".to_string()).await?;
//! assert_eq!(sink.complete().await?.processed, 2);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PacedSinkConfig;
use crate::error::SinkError;
use crate::metrics::LatencyTimer;
use crate::processor::{guarded, Processor};
use crate::queue::SinkQueue;
use crate::sink::lifecycle::Lifecycle;
use crate::sink::report::Outcomes;
use crate::sink::{CompletionSummary, DataSink, SinkState};

pub struct PacedSink<T: Send + 'static> {
    inner: Arc<PacedInner<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct PacedInner<T> {
    config: PacedSinkConfig,
    queue: SinkQueue<T>,
    processor: Arc<dyn Processor<T>>,
    lifecycle: Lifecycle,
    outcomes: Outcomes,
    /// Cancelled by `complete()`; the worker exits once it also sees an empty queue.
    completing: CancellationToken,
}

impl<T: Send + 'static> PacedSink<T> {
    pub fn new(config: PacedSinkConfig, processor: impl Processor<T>) -> Result<Self, SinkError> {
        config.validate()?;
        info!(sink = %config.name, delay_ms = config.delay_ms, "Paced sink created");
        Ok(Self {
            inner: Arc::new(PacedInner {
                queue: SinkQueue::new(),
                processor: Arc::new(processor),
                lifecycle: Lifecycle::new(&config.name),
                outcomes: Outcomes::new(&config.name),
                completing: CancellationToken::new(),
                config,
            }),
            worker: Mutex::new(None),
        })
    }

    /// Forward processor failures to `tx` in addition to logging them.
    #[must_use]
    pub fn with_failure_channel(self, tx: mpsc::UnboundedSender<SinkError>) -> Self {
        self.inner.outcomes.attach(tx);
        self
    }

    /// Whether the single worker has been started (and not yet joined).
    #[must_use]
    pub fn has_worker(&self) -> bool {
        self.worker.lock().is_some()
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            debug!(sink = %self.inner.config.name, "Starting paced worker");
            crate::metrics::set_workers(&self.inner.config.name, 1);
            *worker = Some(tokio::spawn(run_worker(self.inner.clone())));
        }
    }
}

async fn run_worker<T: Send + 'static>(inner: Arc<PacedInner<T>>) {
    let delay = inner.config.delay();
    let idle_poll = inner.config.idle_poll();

    loop {
        if let Some(item) = inner.queue.try_pop() {
            crate::metrics::set_backlog(&inner.config.name, inner.queue.len());
            tokio::time::sleep(delay).await;
            let result = {
                let _timer = LatencyTimer::new(&inner.config.name);
                guarded(inner.processor.process(item)).await
            };
            inner.outcomes.observe(1, result);
            continue;
        }

        // Once completion is visible no further pushes can happen, so an
        // empty queue now stays empty.
        if inner.completing.is_cancelled() && inner.queue.is_empty() {
            break;
        }

        tokio::select! {
            _ = inner.queue.item_available() => {}
            _ = inner.completing.cancelled() => {}
            _ = tokio::time::sleep(idle_poll) => {}
        }
    }

    crate::metrics::set_workers(&inner.config.name, 0);
    debug!(sink = %inner.config.name, "Paced worker exited");
}

#[async_trait]
impl<T: Send + 'static> DataSink<T> for PacedSink<T> {
    async fn submit(&self, item: T) -> Result<(), SinkError> {
        let inner = &self.inner;
        // Start the worker inside the admission gate so `complete()` can
        // never miss a worker that an accepted item depends on.
        let backlog = inner.lifecycle.admit(|| {
            inner.outcomes.record_submitted();
            let backlog = inner.queue.push(item);
            self.ensure_worker();
            backlog
        })?;
        crate::metrics::set_backlog(&inner.config.name, backlog);
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(sink = %self.inner.config.name))]
    async fn complete(&self) -> Result<CompletionSummary, SinkError> {
        let started = Instant::now();
        self.inner.lifecycle.begin_completion()?;
        self.inner.completing.cancel();

        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            // The worker only exits on an empty queue, so joining it covers
            // both "queue drained" and "worker finished".
            self.inner.outcomes.observe_join(handle.await);
        }
        if !self.inner.queue.is_empty() {
            warn!(
                sink = %self.inner.config.name,
                stranded = self.inner.queue.len(),
                "Paced worker ended with items still queued"
            );
        }

        self.inner.lifecycle.finish();
        let drain_time = started.elapsed();
        crate::metrics::record_drain_duration(&self.inner.config.name, drain_time);
        let summary = self.inner.outcomes.summary(drain_time);
        info!(sink = %self.inner.config.name, %summary, "Paced sink completed");
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

impl<T: Send + 'static> Drop for PacedSink<T> {
    fn drop(&mut self) {
        // Without complete() the worker drains what is queued and then stops.
        self.inner.completing.cancel();
    }
}
