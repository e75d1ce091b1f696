// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types shared by every sink.

use thiserror::Error;

/// Failure reported by a caller-supplied processor.
///
/// The sink never inspects the reason; it is logged, counted and forwarded
/// to the failure channel (if one is attached).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProcessError {
    message: String,
}

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProcessError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ProcessError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// `submit` (or a second `complete`) after completion began.
    #[error("sink is closed: complete() has already been called")]
    Closed,

    #[error("invalid sink configuration: {0}")]
    InvalidConfiguration(String),

    /// The processor failed for one item or one batch.
    #[error("processor failed in sink '{sink}': {source}")]
    Callback {
        sink: String,
        #[source]
        source: ProcessError,
    },

    /// A worker task died (panicked) before it could be joined.
    #[error("worker in sink '{sink}' terminated abnormally: {reason}")]
    WorkerPanicked { sink: String, reason: String },
}

impl SinkError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Short label used for the `error_type` metric dimension.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::Callback { .. } => "callback",
            Self::WorkerPanicked { .. } => "worker_panicked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_error_display_includes_sink_and_reason() {
        let err = SinkError::Callback {
            sink: "orders".into(),
            source: ProcessError::new("downstream unavailable"),
        };
        let text = err.to_string();
        assert!(text.contains("orders"));
        assert!(text.contains("downstream unavailable"));
        assert_eq!(err.kind(), "callback");
    }

    #[test]
    fn test_process_error_conversions() {
        let a: ProcessError = "boom".into();
        let b: ProcessError = String::from("boom").into();
        assert_eq!(a, b);
        assert_eq!(a.message(), "boom");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(SinkError::Closed.kind(), "closed");
        assert_eq!(SinkError::invalid("x").kind(), "invalid_configuration");
    }
}
