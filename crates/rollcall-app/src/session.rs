//! Per-operator state carried between requests.

use rollcall_core::Recognition;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation for the live loops. Checked once per frame.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub name: String,
    pub roll_no: String,
    /// A live loop is running.
    pub camera_on: bool,
    pub stop: StopFlag,
    /// Last identity labelled by a live recognition run.
    pub recognized: Recognition,
    /// Student whose deletion has been requested once and awaits confirmation.
    pub confirm_delete: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a live loop as started and clear any stale stop request.
    pub(crate) fn start_camera(&mut self) {
        self.stop.reset();
        self.camera_on = true;
    }

    pub(crate) fn stop_camera(&mut self) {
        self.camera_on = false;
    }
}
