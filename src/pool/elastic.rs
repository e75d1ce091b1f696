// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Elastic pool: long-lived workers between `min_workers` and `max_workers`.
//!
//! ```text
//! submit ──► queue ──► worker 0 ─┐
//!    │                 worker 1 ─┼──► permit (max_workers) ──► processor
//!    │                 worker N ─┘
//!    └──► ScalingPolicy::decide(backlog, workers) ──► grow / shrink / hold
//! ```
//!
//! Each worker has its own cancellation token, a child of the sink's shutdown
//! token. Shrinking cancels one arbitrary worker; it finishes the item it is
//! holding and exits at its next loop check. `complete()` waits for the queue
//! to drain before raising shutdown, so no queued item is abandoned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ElasticSinkConfig;
use crate::error::SinkError;
use crate::metrics::LatencyTimer;
use crate::processor::{guarded, Processor};
use crate::queue::SinkQueue;
use crate::sink::lifecycle::Lifecycle;
use crate::sink::report::Outcomes;
use crate::sink::{CompletionSummary, DataSink, SinkState};

use super::scaling::{ScalingDecision, ScalingPolicy};

pub struct ElasticSink<T: Send + 'static> {
    inner: Arc<ElasticInner<T>>,
}

struct ElasticInner<T> {
    config: ElasticSinkConfig,
    policy: ScalingPolicy,
    queue: SinkQueue<T>,
    processor: Arc<dyn Processor<T>>,
    /// Caps concurrent processor calls at `max_workers` even while a
    /// retiring worker overlaps its replacement.
    permits: Semaphore,
    shutdown: CancellationToken,
    registry: Mutex<WorkerRegistry>,
    runtime: Handle,
    lifecycle: Lifecycle,
    outcomes: Outcomes,
}

struct LiveWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct WorkerRegistry {
    live: HashMap<u64, LiveWorker>,
    /// Cancelled workers that may still be finishing an item.
    retired: Vec<JoinHandle<()>>,
    next_id: u64,
}

impl<T: Send + 'static> ElasticSink<T> {
    /// Create the sink and start `min_workers` workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ElasticSinkConfig, processor: impl Processor<T>) -> Result<Self, SinkError> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| SinkError::invalid("ElasticSink must be created inside a tokio runtime"))?;

        let inner = Arc::new(ElasticInner {
            policy: ScalingPolicy::from(&config),
            queue: SinkQueue::new(),
            processor: Arc::new(processor),
            permits: Semaphore::new(config.max_workers),
            shutdown: CancellationToken::new(),
            registry: Mutex::new(WorkerRegistry::default()),
            runtime,
            lifecycle: Lifecycle::new(&config.name),
            outcomes: Outcomes::new(&config.name),
            config,
        });

        for _ in 0..inner.config.min_workers {
            inner.add_worker();
        }

        info!(
            sink = %inner.config.name,
            min_workers = inner.config.min_workers,
            max_workers = inner.config.max_workers,
            scaling_factor = inner.config.scaling_factor,
            "Elastic sink started"
        );
        Ok(Self { inner })
    }

    /// Forward processor failures to `tx` in addition to logging them.
    #[must_use]
    pub fn with_failure_channel(self, tx: mpsc::UnboundedSender<SinkError>) -> Self {
        self.inner.outcomes.attach(tx);
        self
    }

    /// Workers currently registered (retiring workers excluded).
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.registry.lock().live.len()
    }

    /// Ids of the registered workers, sorted. Ids are never reused.
    #[must_use]
    pub fn worker_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.inner.registry.lock().live.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn policy(&self) -> ScalingPolicy {
        self.inner.policy
    }
}

impl<T: Send + 'static> ElasticInner<T> {
    fn rescale(self: &Arc<Self>, backlog: usize) {
        let workers = self.registry.lock().live.len();
        match self.policy.decide(backlog, workers) {
            ScalingDecision::Grow => {
                self.add_worker();
            }
            ScalingDecision::Shrink => {
                self.remove_worker();
            }
            ScalingDecision::Hold => {}
        }
    }

    /// Bounds are re-checked under the registry lock since concurrent
    /// submits may have decided on the same stale count.
    fn add_worker(self: &Arc<Self>) -> bool {
        let mut registry = self.registry.lock();
        if self.shutdown.is_cancelled() || registry.live.len() >= self.config.max_workers {
            return false;
        }

        let id = registry.next_id;
        registry.next_id += 1;
        let cancel = self.shutdown.child_token();
        let handle = self.runtime.spawn(run_worker(self.clone(), id, cancel.clone()));
        registry.live.insert(id, LiveWorker { cancel, handle });
        let count = registry.live.len();
        drop(registry);

        crate::metrics::set_workers(&self.config.name, count);
        crate::metrics::record_scaling(&self.config.name, ScalingDecision::Grow.as_str());
        debug!(sink = %self.config.name, worker = id, workers = count, "Worker added");
        true
    }

    fn remove_worker(&self) -> bool {
        let mut registry = self.registry.lock();
        if registry.live.len() <= self.config.min_workers {
            return false;
        }

        // HashMap order is unspecified, so which worker goes is arbitrary.
        let Some(id) = registry.live.keys().next().copied() else {
            return false;
        };
        let Some(victim) = registry.live.remove(&id) else {
            return false;
        };
        victim.cancel.cancel();
        registry.retired.retain(|h| !h.is_finished());
        registry.retired.push(victim.handle);
        let count = registry.live.len();
        drop(registry);

        crate::metrics::set_workers(&self.config.name, count);
        crate::metrics::record_scaling(&self.config.name, ScalingDecision::Shrink.as_str());
        debug!(sink = %self.config.name, worker = id, workers = count, "Worker retired");
        true
    }
}

async fn run_worker<T: Send + 'static>(inner: Arc<ElasticInner<T>>, id: u64, cancel: CancellationToken) {
    let name = inner.config.name.as_str();
    let idle_poll = inner.config.idle_poll();

    while !cancel.is_cancelled() {
        let Some(item) = inner.queue.try_pop() else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = inner.queue.item_available() => {}
                _ = tokio::time::sleep(idle_poll) => {}
            }
            continue;
        };
        crate::metrics::set_backlog(name, inner.queue.len());

        // Once dequeued the item is ours: the permit wait is not cancellable
        // and the semaphore is never closed.
        let _permit = inner.permits.acquire().await.ok();
        let result = {
            let _timer = LatencyTimer::new(name);
            guarded(inner.processor.process(item)).await
        };
        inner.outcomes.observe(1, result);
    }

    debug!(sink = %name, worker = id, "Elastic worker exited");
}

#[async_trait]
impl<T: Send + 'static> DataSink<T> for ElasticSink<T> {
    async fn submit(&self, item: T) -> Result<(), SinkError> {
        let inner = &self.inner;
        let backlog = inner.lifecycle.admit(|| {
            inner.outcomes.record_submitted();
            inner.queue.push(item)
        })?;
        crate::metrics::set_backlog(&inner.config.name, backlog);
        inner.rescale(backlog);
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(sink = %self.inner.config.name))]
    async fn complete(&self) -> Result<CompletionSummary, SinkError> {
        let started = Instant::now();
        self.inner.lifecycle.begin_completion()?;

        self.inner.queue.wait_drained().await;
        self.inner.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut registry = self.inner.registry.lock();
            let live = registry.live.drain().map(|(_, w)| w.handle);
            let mut handles: Vec<_> = live.collect();
            handles.append(&mut registry.retired);
            handles
        };
        debug!(workers = handles.len(), "Joining elastic workers");
        for handle in handles {
            self.inner.outcomes.observe_join(handle.await);
        }
        crate::metrics::set_workers(&self.inner.config.name, 0);

        self.inner.lifecycle.finish();
        let drain_time = started.elapsed();
        crate::metrics::record_drain_duration(&self.inner.config.name, drain_time);
        let summary = self.inner.outcomes.summary(drain_time);
        info!(sink = %self.inner.config.name, %summary, "Elastic sink completed");
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

impl<T: Send + 'static> Drop for ElasticSink<T> {
    fn drop(&mut self) {
        // Dropped without complete(): stop the workers, queued items are lost.
        self.inner.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(min: usize, max: usize, factor: f64) -> ElasticSinkConfig {
        ElasticSinkConfig {
            name: "test-elastic".into(),
            min_workers: min,
            max_workers: max,
            scaling_factor: factor,
            idle_poll_ms: 10,
        }
    }

    fn noop() -> impl Processor<u64> {
        |_: u64| async { Ok::<(), ProcessError>(()) }
    }

    /// Processor that blocks until the gate is opened.
    fn gated(open: &watch::Sender<bool>, done: &Arc<AtomicUsize>) -> impl Processor<u64> {
        let rx = open.subscribe();
        let done = done.clone();
        move |_: u64| {
            let mut rx = rx.clone();
            let done = done.clone();
            async move {
                let _ = rx.wait_for(|open| *open).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<(), ProcessError>(())
            }
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_starts_with_min_workers() {
        let sink = ElasticSink::new(config(3, 6, 4.0), noop()).unwrap();
        assert_eq!(sink.worker_count(), 3);
        assert_eq!(sink.worker_ids(), vec![0, 1, 2]);
        sink.complete().await.unwrap();
        assert_eq!(sink.worker_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_grows_to_max_then_shrinks_to_min() {
        let (open, _) = watch::channel(false);
        let done = Arc::new(AtomicUsize::new(0));
        let sink = ElasticSink::new(config(1, 4, 1.0), gated(&open, &done)).unwrap();

        for i in 0..40 {
            sink.submit(i).await.unwrap();
            let workers = sink.worker_count();
            assert!((1..=4).contains(&workers), "worker count {workers} out of bounds");
        }
        assert_eq!(sink.worker_count(), 4);

        open.send_replace(true);
        wait_until(|| done.load(Ordering::SeqCst) == 40).await;
        let before: HashSet<u64> = sink.worker_ids().into_iter().collect();

        // A trickle of single items keeps backlog below workers / factor.
        for i in 100..106 {
            sink.submit(i).await.unwrap();
            wait_until(|| sink.backlog() == 0).await;
        }
        assert_eq!(sink.worker_count(), 1);

        // Which worker survives is unspecified; it just has to be one of them.
        let survivor = sink.worker_ids();
        assert!(before.contains(&survivor[0]));

        let summary = sink.complete().await.unwrap();
        assert_eq!(summary.processed, 46);
        assert!(summary.fully_drained());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_once_under_scaling_churn() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let processor = {
            let seen = seen.clone();
            move |item: u64| {
                let seen = seen.clone();
                async move {
                    if item % 7 == 0 {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                    seen.lock().push(item);
                    Ok::<(), ProcessError>(())
                }
            }
        };
        let sink = Arc::new(ElasticSink::new(config(1, 8, 0.5), processor).unwrap());

        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    for i in 0..100 {
                        sink.submit(p * 1_000 + i).await.unwrap();
                        if i % 10 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        let summary = sink.complete().await.unwrap();
        assert_eq!(summary.processed, 400);
        assert_eq!(summary.worker_faults, 0);

        let seen = seen.lock();
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(seen.len(), 400);
        assert_eq!(unique.len(), 400);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_complete_waits_for_in_flight_items() {
        let (open, _) = watch::channel(false);
        let done = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(ElasticSink::new(config(2, 2, 4.0), gated(&open, &done)).unwrap());
        for i in 0..5 {
            sink.submit(i).await.unwrap();
        }

        let completer = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.complete().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!completer.is_finished());
        assert_eq!(sink.submit(99).await, Err(SinkError::Closed));

        open.send_replace(true);
        let summary = completer.await.unwrap().unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(summary.processed, 5);
    }

    #[tokio::test]
    async fn test_invalid_configs_rejected() {
        let cases = [
            config(0, 4, 4.0),
            config(5, 4, 4.0),
            config(1, 4, 0.0),
            config(1, 4, f64::NAN),
            config(1, usize::MAX, 4.0),
        ];
        for case in cases {
            let result = ElasticSink::new(case.clone(), noop());
            assert!(
                matches!(result, Err(SinkError::InvalidConfiguration(_))),
                "accepted {case:?}"
            );
        }
    }

    #[test]
    fn test_requires_runtime() {
        let result = ElasticSink::new(config(1, 2, 4.0), noop());
        assert!(matches!(result, Err(SinkError::InvalidConfiguration(_))));
    }
}
