// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backlog-driven grow/shrink decision for the elastic pool.
//!
//! The rule compares the raw backlog against the current worker count:
//!
//! - **grow** when `backlog > workers * factor` and below `max_workers`
//! - **shrink** when `backlog < workers / factor` and above `min_workers`
//!
//! There is no smoothing or hysteresis: a backlog that hovers around a
//! threshold can grow and shrink on consecutive submits.
//!
//! # Example
//!
//! ```
//! use ingest_sinks::{ScalingDecision, ScalingPolicy};
//!
//! let policy = ScalingPolicy { min_workers: 1, max_workers: 4, scaling_factor: 2.0 };
//! assert_eq!(policy.decide(5, 2), ScalingDecision::Grow);   // 5 > 2 * 2
//! assert_eq!(policy.decide(0, 2), ScalingDecision::Shrink); // 0 < 2 / 2
//! assert_eq!(policy.decide(3, 2), ScalingDecision::Hold);
//! ```

use crate::config::ElasticSinkConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    Grow,
    Shrink,
    Hold,
}

impl ScalingDecision {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grow => "grow",
            Self::Shrink => "shrink",
            Self::Hold => "hold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingPolicy {
    pub min_workers: usize,
    pub max_workers: usize,
    pub scaling_factor: f64,
}

impl ScalingPolicy {
    #[must_use]
    pub fn decide(&self, backlog: usize, workers: usize) -> ScalingDecision {
        let backlog_f = backlog as f64;
        let workers_f = workers as f64;

        if backlog_f > workers_f * self.scaling_factor && workers < self.max_workers {
            ScalingDecision::Grow
        } else if backlog_f < workers_f / self.scaling_factor && workers > self.min_workers {
            ScalingDecision::Shrink
        } else {
            ScalingDecision::Hold
        }
    }
}

impl From<&ElasticSinkConfig> for ScalingPolicy {
    fn from(config: &ElasticSinkConfig) -> Self {
        Self {
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            scaling_factor: config.scaling_factor,
        }
    }
}
