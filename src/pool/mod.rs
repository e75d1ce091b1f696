// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Worker pools.
//!
//! - [`BufferedSink`]: fixed capacity, workers spawned per burst
//! - [`ElasticSink`]: long-lived workers resized by [`ScalingPolicy`]

mod elastic;
mod fixed;
mod scaling;

pub use elastic::ElasticSink;
pub use fixed::BufferedSink;
pub use scaling::{ScalingDecision, ScalingPolicy};
