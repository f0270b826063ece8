//! Operator-side control of a running acquisition.
//!
//! Stop and start-gate flags are `tokio::sync::watch` channels. The operator
//! holds an [`AcquisitionControl`] (cloneable, so a Ctrl-C handler and a
//! countdown can share it); the loop holds the matching [`ControlContext`]
//! and checks it once per iteration.

use std::sync::Arc;
use tokio::sync::watch;

/// Operator handle: sets the start gate and requests stop.
#[derive(Clone, Debug)]
pub struct AcquisitionControl {
    stop_tx: Arc<watch::Sender<bool>>,
    gate_tx: Arc<watch::Sender<bool>>,
}

/// Loop-side view of the control flags.
#[derive(Debug)]
pub struct ControlContext {
    stop_rx: watch::Receiver<bool>,
    gate_rx: watch::Receiver<bool>,
}

impl AcquisitionControl {
    /// Create a control pair with the gate closed and no stop requested.
    pub fn new() -> (Self, ControlContext) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (gate_tx, gate_rx) = watch::channel(false);
        (
            Self {
                stop_tx: Arc::new(stop_tx),
                gate_tx: Arc::new(gate_tx),
            },
            ControlContext { stop_rx, gate_rx },
        )
    }

    /// Open the recording gate; decoded samples are recorded from now on.
    pub fn start_recording(&self) {
        self.gate_tx.send_replace(true);
    }

    /// Ask the loop to stop at its next iteration.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }
}

impl ControlContext {
    /// Whether the loop should exit now.
    pub fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Whether decoded samples should be recorded.
    pub fn recording_gate(&self) -> bool {
        *self.gate_rx.borrow()
    }
}
