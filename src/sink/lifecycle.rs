// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Running → Completing → Completed, shared by every sink variant.
//!
//! The admission gate makes "check state, then enqueue" atomic with respect
//! to `begin_completion()`: a submission either lands in the queue before
//! the watershed (and will be drained) or is rejected with
//! [`SinkError::Closed`]. Nothing can slip in after `complete()` has started
//! waiting for the queue to empty.

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::error::SinkError;

use super::SinkState;

pub(crate) struct Lifecycle {
    sink: String,
    /// Read side held by `admit` for the duration of an enqueue; write side
    /// held by `begin_completion` for the state flip.
    gate: RwLock<()>,
    state: watch::Sender<SinkState>,
}

impl Lifecycle {
    pub(crate) fn new(sink: &str) -> Self {
        let (state, _) = watch::channel(SinkState::Running);
        crate::metrics::set_sink_state(sink, "Running");
        Self {
            sink: sink.to_string(),
            gate: RwLock::new(()),
            state,
        }
    }

    /// Run `enqueue` only if the sink is still `Running`.
    ///
    /// `enqueue` must be short and non-blocking. Flushes and other follow-up
    /// work belong after this returns.
    pub(crate) fn admit<R>(&self, enqueue: impl FnOnce() -> R) -> Result<R, SinkError> {
        let _gate = self.gate.read();
        if *self.state.borrow() != SinkState::Running {
            crate::metrics::record_submit(&self.sink, false);
            return Err(SinkError::Closed);
        }
        let out = enqueue();
        crate::metrics::record_submit(&self.sink, true);
        Ok(out)
    }

    /// Flip `Running` → `Completing`. Fails with `Closed` if completion
    /// already began.
    pub(crate) fn begin_completion(&self) -> Result<(), SinkError> {
        let _gate = self.gate.write();
        let began = self.state.send_if_modified(|state| {
            if *state == SinkState::Running {
                *state = SinkState::Completing;
                true
            } else {
                false
            }
        });
        if !began {
            return Err(SinkError::Closed);
        }
        debug!(sink = %self.sink, "Sink completing");
        crate::metrics::set_sink_state(&self.sink, "Completing");
        Ok(())
    }

    pub(crate) fn finish(&self) {
        self.state.send_replace(SinkState::Completed);
        crate::metrics::set_sink_state(&self.sink, "Completed");
    }

    pub(crate) fn state(&self) -> SinkState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SinkState> {
        self.state.subscribe()
    }
}
