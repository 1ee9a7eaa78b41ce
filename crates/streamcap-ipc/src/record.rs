//! The status record: one small JSON mailbox per orchestrator instance.
//!
//! The record is exclusively written by the recorder process that owns it.
//! External callers only ever flip `stop_requested` from false to true; the
//! owner observes the flag on its next self-poll tick, shuts down, and
//! deletes the record.

use serde::{Deserialize, Serialize};

/// Cross-process status of one recorder instance.
///
/// Field names are the wire contract read by the `list`/`stop` front ends;
/// renaming any of them breaks older tooling on the same host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Process id of the owning recorder.
    pub pid: u32,
    /// A capture subprocess is currently running.
    pub is_recording: bool,
    /// A monitor loop is currently polling.
    pub is_monitoring: bool,
    /// The URL being monitored or recorded, if any.
    pub monitor_url: Option<String>,
    /// Set by external callers; monotonic false -> true for the record's life.
    pub stop_requested: bool,
    /// Unix timestamp (seconds) of the last write by the owner.
    pub timestamp: f64,
}

impl StatusRecord {
    /// Create a fresh record for the given process, all flags cleared.
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            is_recording: false,
            is_monitoring: false,
            monitor_url: None,
            stop_requested: false,
            timestamp: now_secs(),
        }
    }

    /// A record is active while its owner is recording or monitoring.
    pub fn is_active(&self) -> bool {
        self.is_recording || self.is_monitoring
    }

    /// Refresh the last-update timestamp.
    pub fn touch(&mut self) {
        self.timestamp = now_secs();
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
