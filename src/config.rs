//! Configuration for each sink variant.
//!
//! Durations are carried as millisecond integers so configs can be read
//! straight from JSON/TOML. Every config has a `validate()` that the sink
//! constructors call; invalid values surface as
//! [`SinkError::InvalidConfiguration`](crate::SinkError::InvalidConfiguration).
//!
//! # Example
//!
//! ```
//! use ingest_sinks::ElasticSinkConfig;
//!
//! let config = ElasticSinkConfig {
//!     min_workers: 2,
//!     max_workers: 8,
//!     scaling_factor: 4.0,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//!
//! let broken = ElasticSinkConfig { min_workers: 0, ..Default::default() };
//! assert!(broken.validate().is_err());
//! ```

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::error::SinkError;

/// Size/time batching.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSinkConfig {
    /// Label used in logs and metrics
    #[serde(default = "default_batch_name")]
    pub name: String,

    /// Flush once this many items are queued (and never hand out more per batch)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush whatever is queued every this many milliseconds
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u64,
}

/// Single worker with a fixed delay before each item.
#[derive(Debug, Clone, Deserialize)]
pub struct PacedSinkConfig {
    #[serde(default = "default_paced_name")]
    pub name: String,

    /// Wait this long after dequeuing each item before processing it
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Upper bound on an idle wait between queue checks
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

/// Fixed-capacity worker pool.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSinkConfig {
    #[serde(default = "default_pool_name")]
    pub name: String,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

/// Worker pool that resizes between `min_workers` and `max_workers`.
#[derive(Debug, Clone, Deserialize)]
pub struct ElasticSinkConfig {
    #[serde(default = "default_elastic_name")]
    pub name: String,

    #[serde(default = "default_min_workers")]
    pub min_workers: usize,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Grow when backlog > workers * factor, shrink when backlog < workers / factor
    #[serde(default = "default_scaling_factor")]
    pub scaling_factor: f64,

    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

fn default_batch_name() -> String { "batch".to_string() }
fn default_paced_name() -> String { "paced".to_string() }
fn default_pool_name() -> String { "pool".to_string() }
fn default_elastic_name() -> String { "elastic".to_string() }
fn default_batch_size() -> usize { 100 }
fn default_time_limit_ms() -> u64 { 1_000 }
fn default_delay_ms() -> u64 { 100 }
fn default_idle_poll_ms() -> u64 { 50 }
fn default_min_workers() -> usize { 1 }
fn default_max_workers() -> usize { 4 }
fn default_scaling_factor() -> f64 { 4.0 }

impl Default for BatchSinkConfig {
    fn default() -> Self {
        Self {
            name: default_batch_name(),
            batch_size: default_batch_size(),
            time_limit_ms: default_time_limit_ms(),
        }
    }
}

impl Default for PacedSinkConfig {
    fn default() -> Self {
        Self {
            name: default_paced_name(),
            delay_ms: default_delay_ms(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl Default for PoolSinkConfig {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            max_workers: default_max_workers(),
        }
    }
}

impl Default for ElasticSinkConfig {
    fn default() -> Self {
        Self {
            name: default_elastic_name(),
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            scaling_factor: default_scaling_factor(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl BatchSinkConfig {
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.batch_size == 0 {
            return Err(SinkError::invalid("batch_size must be positive"));
        }
        if self.time_limit_ms == 0 {
            return Err(SinkError::invalid("time_limit_ms must be positive"));
        }
        Ok(())
    }

    #[must_use]
    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_limit_ms)
    }
}

impl PacedSinkConfig {
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.idle_poll_ms == 0 {
            return Err(SinkError::invalid("idle_poll_ms must be positive"));
        }
        Ok(())
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    #[must_use]
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl PoolSinkConfig {
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.max_workers == 0 {
            return Err(SinkError::invalid("max_workers must be positive"));
        }
        check_permit_limit(self.max_workers)?;
        // Semaphore::acquire_many takes a u32
        if u32::try_from(self.max_workers).is_err() {
            return Err(SinkError::invalid("max_workers does not fit in u32"));
        }
        Ok(())
    }
}

impl ElasticSinkConfig {
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.min_workers == 0 {
            return Err(SinkError::invalid("min_workers must be positive"));
        }
        if self.max_workers < self.min_workers {
            return Err(SinkError::invalid(format!(
                "max_workers ({}) must be >= min_workers ({})",
                self.max_workers, self.min_workers
            )));
        }
        check_permit_limit(self.max_workers)?;
        if !self.scaling_factor.is_finite() || self.scaling_factor <= 0.0 {
            return Err(SinkError::invalid(format!(
                "scaling_factor must be a positive number, got {}",
                self.scaling_factor
            )));
        }
        if self.idle_poll_ms == 0 {
            return Err(SinkError::invalid("idle_poll_ms must be positive"));
        }
        Ok(())
    }

    #[must_use]
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// Worker slots are semaphore permits, and tokio panics above `MAX_PERMITS`.
fn check_permit_limit(max_workers: usize) -> Result<(), SinkError> {
    if max_workers > Semaphore::MAX_PERMITS {
        return Err(SinkError::invalid(format!(
            "max_workers ({max_workers}) exceeds the semaphore limit ({})",
            Semaphore::MAX_PERMITS
        )));
    }
    Ok(())
}
