//! # Ingest Sinks
//!
//! Asynchronous ingestion sinks: producers hand items to a sink with
//! `submit()` and the sink processes them in the background through a
//! caller-supplied async callback.
//!
//! ## Architecture
//!
//! Every sink is a queue plus a processing strategy behind one contract:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DataSink::submit()                      │
//! │  • Non-blocking, never rejects for load                    │
//! │  • Admission gate: Running only, else SinkError::Closed    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SinkQueue (unbounded)                    │
//! │  • FIFO, multi-producer / multi-consumer                   │
//! │  • Each item dequeued exactly once                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌──────────────┬────┴─────────┬──────────────┐
//!          ▼              ▼              ▼              ▼
//!    BatchingSink     PacedSink     BufferedSink    ElasticSink
//!    count / time     1 worker,     ≤ N transient   min..max workers,
//!    flush token      fixed delay   workers         backlog scaling
//!          │              │              │              │
//!          └──────────────┴──────┬───────┴──────────────┘
//!                                ▼
//!                 Processor / BatchProcessor callback
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use ingest_sinks::{DataSink, ElasticSink, ElasticSinkConfig, ProcessError};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ingest_sinks::SinkError> {
//! let config = ElasticSinkConfig {
//!     name: "events".into(),
//!     min_workers: 1,
//!     max_workers: 8,
//!     ..Default::default()
//! };
//! let sink = ElasticSink::new(config, |event: String| async move {
//!     if event.is_empty() {
//!         return Err(ProcessError::new("empty event"));
//!     }
//!     Ok(())
//! })?;
//!
//! for i in 0..100 {
//!     sink.submit(format!("event-{i}")).await?;
//! }
//!
//! // Stops intake, drains the backlog, joins every worker.
//! let summary = sink.complete().await?;
//! assert_eq!(summary.processed, 100);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Batching**: Flush by item count or elapsed time, one flush at a time
//! - **Pacing**: Strict submission order with a fixed delay per item
//! - **Bounded Pool**: At most `max_workers` concurrent processor calls
//! - **Elastic Pool**: Grow/shrink workers from backlog on every submit
//! - **Graceful Completion**: `complete()` returns only after a full drain
//! - **Failure Isolation**: Callback errors and panics never stop a worker
//!
//! ## Modules
//!
//! - [`sink`]: The [`DataSink`] contract, states and completion summary
//! - [`queue`]: Shared concurrent FIFO
//! - [`batching`]: Count/time batching sink
//! - [`paced`]: Single-worker paced sink
//! - [`pool`]: Fixed and elastic worker pools
//! - [`config`]: Per-variant configuration
//! - [`metrics`]: Metric emission via the `metrics` facade

pub mod config;
pub mod error;
pub mod queue;
pub mod processor;
pub mod sink;
pub mod batching;
pub mod paced;
pub mod pool;
pub mod metrics;

pub use config::{BatchSinkConfig, ElasticSinkConfig, PacedSinkConfig, PoolSinkConfig};
pub use error::{ProcessError, SinkError};
pub use queue::SinkQueue;
pub use processor::{BatchProcessor, Processor};
pub use sink::{CompletionSummary, DataSink, SinkState};
pub use batching::{BatchingSink, FlushReason};
pub use paced::PacedSink;
pub use pool::{BufferedSink, ElasticSink, ScalingDecision, ScalingPolicy};
pub use metrics::LatencyTimer;
