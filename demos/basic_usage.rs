// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic ingest-sinks usage example.
//!
//! Demonstrates:
//! 1. A batching sink flushing by count and by time
//! 2. A paced sink delaying each item
//! 3. A fixed pool capping concurrency
//! 4. An elastic pool growing under a burst and shrinking afterwards
//! 5. Collecting callback failures from a channel
//! 6. Displaying the emitted metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ingest_sinks::{
    BatchSinkConfig, BatchingSink, BufferedSink, DataSink, ElasticSink, ElasticSinkConfig,
    PacedSink, PacedSinkConfig, PoolSinkConfig, ProcessError,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           ingest-sinks: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Batching: 23 items, batch_size 10 → 10, 10, then 3 on the timer
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Batching sink (batch_size=10, time_limit=200ms)");
    let batching = BatchingSink::new(
        BatchSinkConfig { name: "demo-batch".into(), batch_size: 10, time_limit_ms: 200 },
        |batch: Vec<u32>| async move {
            println!("   └─ batch of {} starting at {}", batch.len(), batch[0]);
            Ok::<(), ProcessError>(())
        },
    )?;
    for i in 0..23 {
        batching.submit(i).await?;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    let summary = batching.complete().await?;
    println!("   ✅ {summary}");

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Paced: one item every 50ms, in order
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n⏱️  Paced sink (delay=50ms)");
    let started = Instant::now();
    let paced = PacedSink::new(
        PacedSinkConfig { name: "demo-paced".into(), delay_ms: 50, ..Default::default() },
        move |msg: &'static str| async move {
            println!("   └─ {msg} at {:?}", started.elapsed());
            Ok::<(), ProcessError>(())
        },
    )?;
    for msg in ["first", "second", "third"] {
        paced.submit(msg).await?;
    }
    println!("   ✅ {}", paced.complete().await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Fixed pool: 30 slow items, never more than 3 at once
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧵 Buffered sink (max_workers=3)");
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let pool = {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        BufferedSink::new(
            PoolSinkConfig { name: "demo-pool".into(), max_workers: 3 },
            move |_: u32| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), ProcessError>(())
                }
            },
        )?
    };
    for i in 0..30 {
        pool.submit(i).await?;
    }
    println!("   └─ active workers after burst: {}", pool.active_workers());
    let summary = pool.complete().await?;
    println!("   ✅ {summary} (peak concurrency {})", peak.load(Ordering::SeqCst));

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Elastic pool: burst grows it, trickle shrinks it; failures on a channel
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Elastic sink (min=1, max=6, factor=2.0)");
    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
    let elastic = ElasticSink::new(
        ElasticSinkConfig {
            name: "demo-elastic".into(),
            min_workers: 1,
            max_workers: 6,
            scaling_factor: 2.0,
            ..Default::default()
        },
        |n: u32| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if n % 25 == 0 {
                return Err(ProcessError::new(format!("rejected record {n}")));
            }
            Ok(())
        },
    )?
    .with_failure_channel(failures_tx);

    for i in 1..=100 {
        elastic.submit(i).await?;
    }
    println!("   └─ workers after burst: {}", elastic.worker_count());

    while elastic.backlog() > 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for i in 101..=105 {
        elastic.submit(i).await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    println!("   └─ workers after trickle: {}", elastic.worker_count());

    let summary = elastic.complete().await?;
    println!("   ✅ {summary}");
    while let Ok(err) = failures_rx.try_recv() {
        println!("   ⚠️  {err}");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Raw Metrics:");
    dump_metrics(&snapshotter);

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<(String, String)> = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let name = format!("{}{{{}}}", key.name(), labels.join(","));

        let rendered = match value {
            DebugValue::Counter(v) => format!("counter   {v}"),
            DebugValue::Gauge(v) => format!("gauge     {}", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                format!("histogram n={count} avg={avg:.6}")
            }
        };
        lines.push((name, rendered));
    }

    lines.sort();
    for (name, rendered) in &lines {
        println!("   └─ {name:<70} {rendered}");
    }
}
