//! Signal handling for graceful shutdown of a recorder instance.
//!
//! SIGINT and SIGTERM feed the same shutdown token the cross-process stop
//! flag feeds, so both paths go through the identical orderly teardown.

use std::thread::{self, JoinHandle};

use tracing::info;

use crate::error::RecordError;
use crate::shutdown::ShutdownToken;

/// Triggers a [`ShutdownToken`] when SIGINT or SIGTERM is received.
pub struct SignalHandler {
    #[allow(dead_code)]
    handle: Option<JoinHandle<()>>,
}

impl SignalHandler {
    #[cfg(unix)]
    pub fn setup(token: ShutdownToken) -> crate::Result<Self> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(RecordError::Io)?;

        let handle = thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!(signal = sig, "received signal, initiating graceful shutdown");
                    token.trigger();
                }
            })
            .map_err(RecordError::Io)?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    #[cfg(not(unix))]
    pub fn setup(_token: ShutdownToken) -> crate::Result<Self> {
        Ok(Self { handle: None })
    }
}
