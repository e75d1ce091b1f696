// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fixed-capacity pool: up to `max_workers` transient workers.
//!
//! Workers are spawned on demand by `submit` and exit once the queue looks
//! empty. Capacity is a semaphore with `max_workers` permits; a worker owns
//! one permit for its whole life.
//!
//! Releasing a permit and seeing an empty queue are two separate steps, so a
//! submit can land between them and fail to get a permit. To avoid stranding
//! that item, a worker re-checks the queue after releasing its permit and,
//! if items remain, tries to take a permit again and keep going.
//!
//! The two sides form a store-buffering pair: submit pushes then tries the
//! semaphore, a worker releases the semaphore then checks the queue. With
//! plain acquire/release loads both could read stale values and strand the
//! item. The worker's check therefore goes through the queue lock
//! ([`SinkQueue::is_empty_locked`](crate::SinkQueue::is_empty_locked)): either
//! it runs after the push's critical section and sees the item, or it runs
//! before it, in which case the permit release happens-before the submitter's
//! `try_acquire_owned` and that succeeds.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::config::PoolSinkConfig;
use crate::error::SinkError;
use crate::metrics::LatencyTimer;
use crate::processor::{guarded, Processor};
use crate::queue::SinkQueue;
use crate::sink::lifecycle::Lifecycle;
use crate::sink::report::Outcomes;
use crate::sink::{CompletionSummary, DataSink, SinkState};

pub struct BufferedSink<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    config: PoolSinkConfig,
    queue: SinkQueue<T>,
    processor: Arc<dyn Processor<T>>,
    slots: Arc<Semaphore>,
    lifecycle: Lifecycle,
    outcomes: Outcomes,
}

impl<T: Send + 'static> BufferedSink<T> {
    pub fn new(config: PoolSinkConfig, processor: impl Processor<T>) -> Result<Self, SinkError> {
        config.validate()?;
        info!(sink = %config.name, max_workers = config.max_workers, "Buffered sink created");
        Ok(Self {
            inner: Arc::new(PoolInner {
                queue: SinkQueue::new(),
                processor: Arc::new(processor),
                slots: Arc::new(Semaphore::new(config.max_workers)),
                lifecycle: Lifecycle::new(&config.name),
                outcomes: Outcomes::new(&config.name),
                config,
            }),
        })
    }

    /// Forward processor failures to `tx` in addition to logging them.
    #[must_use]
    pub fn with_failure_channel(self, tx: mpsc::UnboundedSender<SinkError>) -> Self {
        self.inner.outcomes.attach(tx);
        self
    }

    /// Number of worker slots currently taken.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.inner.config.max_workers - self.inner.slots.available_permits()
    }

    #[must_use]
    pub fn config(&self) -> &PoolSinkConfig {
        &self.inner.config
    }
}

async fn run_worker<T: Send + 'static>(inner: Arc<PoolInner<T>>, slot: OwnedSemaphorePermit) {
    let name = inner.config.name.as_str();
    let mut slot = Some(slot);

    while let Some(held) = slot.take() {
        crate::metrics::set_workers(name, inner.config.max_workers - inner.slots.available_permits());

        while let Some(item) = inner.queue.try_pop() {
            crate::metrics::set_backlog(name, inner.queue.len());
            let result = {
                let _timer = LatencyTimer::new(name);
                guarded(inner.processor.process(item)).await
            };
            inner.outcomes.observe(1, result);
        }

        drop(held);
        if !inner.queue.is_empty_locked() {
            // Either we get the slot back, or another worker holds it and
            // will see these items on its own re-check.
            slot = inner.slots.clone().try_acquire_owned().ok();
        }
    }

    crate::metrics::set_workers(name, inner.config.max_workers - inner.slots.available_permits());
    debug!(sink = %name, "Pool worker exited");
}

#[async_trait]
impl<T: Send + 'static> DataSink<T> for BufferedSink<T> {
    async fn submit(&self, item: T) -> Result<(), SinkError> {
        let inner = &self.inner;
        let backlog = inner.lifecycle.admit(|| {
            inner.outcomes.record_submitted();
            inner.queue.push(item)
        })?;
        crate::metrics::set_backlog(&inner.config.name, backlog);

        // No free slot means every slot's worker has yet to do its final
        // queue check, so the item will be picked up.
        if let Ok(slot) = inner.slots.clone().try_acquire_owned() {
            debug!(sink = %inner.config.name, backlog, "Spawning pool worker");
            tokio::spawn(run_worker(inner.clone(), slot));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(sink = %self.inner.config.name))]
    async fn complete(&self) -> Result<CompletionSummary, SinkError> {
        let started = Instant::now();
        self.inner.lifecycle.begin_completion()?;

        self.inner.queue.wait_drained().await;

        // Holding every slot means no worker is mid-item.
        let all = self.inner.config.max_workers as u32;
        if let Ok(slots) = self.inner.slots.acquire_many(all).await {
            self.inner.slots.close();
            drop(slots);
        }

        self.inner.lifecycle.finish();
        let drain_time = started.elapsed();
        crate::metrics::record_drain_duration(&self.inner.config.name, drain_time);
        let summary = self.inner.outcomes.summary(drain_time);
        info!(sink = %self.inner.config.name, %summary, "Buffered sink completed");
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
