// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The uniform sink contract.
//!
//! Every variant ([`BatchingSink`](crate::BatchingSink),
//! [`PacedSink`](crate::PacedSink), [`BufferedSink`](crate::BufferedSink),
//! [`ElasticSink`](crate::ElasticSink)) implements [`DataSink`], so a host
//! can hold any of them as `Box<dyn DataSink<T>>`.
//!
//! # Lifecycle
//!
//! ```text
//! Running ──complete()──▶ Completing ──drained──▶ Completed
//! ```

mod types;
pub(crate) mod lifecycle;
pub(crate) mod report;

pub use types::{CompletionSummary, SinkState};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::SinkError;

#[async_trait]
pub trait DataSink<T: Send + 'static>: Send + Sync {
    /// Hand an item to the sink.
    ///
    /// Never rejects because of load. Fails with [`SinkError::Closed`] once
    /// `complete()` has been called, even if draining is still in progress.
    async fn submit(&self, item: T) -> Result<(), SinkError>;

    /// Stop accepting items and wait until every accepted item has been
    /// processed and every worker/timer has exited.
    ///
    /// Call exactly once. A second call is a caller error: it returns
    /// [`SinkError::Closed`] immediately and does not wait for the drain.
    async fn complete(&self) -> Result<CompletionSummary, SinkError>;

    fn state(&self) -> SinkState;

    fn state_receiver(&self) -> watch::Receiver<SinkState>;

    /// Items queued but not yet dequeued by a worker or flush.
    fn backlog(&self) -> usize;

    fn name(&self) -> &str;
}
