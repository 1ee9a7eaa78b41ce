//! The monitor loop: poll one room URL until it goes live, then hand off.
//!
//! Launching is behind the [`SessionLauncher`] seam so the loop itself knows
//! nothing about subprocesses; the loop's only jobs are pacing, liveness
//! probing, and not starting a second session for a URL that already has one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::resolver::{Quality, ResolverRegistry};
use crate::shutdown::ShutdownToken;

/// Starts recording sessions on behalf of the monitor loop.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// True while a session for this URL is still active; the monitor skips
    /// its cycle instead of double-recording.
    fn is_active(&self, url: &str) -> bool;

    /// Begin a session for a stream just confirmed live. Must return once
    /// the session is started, not when it finishes.
    async fn launch(&self, url: &str, platform: &'static str) -> crate::Result<()>;
}

/// Polls one URL on a fixed interval.
pub struct Monitor {
    url: String,
    quality: Quality,
    interval: Duration,
    registry: Arc<ResolverRegistry>,
    launcher: Arc<dyn SessionLauncher>,
    shutdown: ShutdownToken,
}

impl Monitor {
    pub fn new(
        url: impl Into<String>,
        quality: Quality,
        interval: Duration,
        registry: Arc<ResolverRegistry>,
        launcher: Arc<dyn SessionLauncher>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            url: url.into(),
            quality,
            interval,
            registry,
            launcher,
            shutdown,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run until the shutdown token fires. Cancellation interrupts the
    /// inter-cycle sleep immediately; it never touches an in-flight session.
    pub async fn run(self) {
        info!(url = %self.url, interval = ?self.interval, "monitor started");
        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }
        info!(url = %self.url, "monitor stopped");
    }

    async fn tick(&self) {
        if self.launcher.is_active(&self.url) {
            debug!(url = %self.url, "session still active, skipping cycle");
            return;
        }

        let (platform, resolver) = self.registry.resolver_for(&self.url);
        match resolver.resolve(&self.url, self.quality).await {
            Ok(info) if info.is_live => {
                info!(url = %self.url, platform, "stream is live");
                if let Err(e) = self.launcher.launch(&self.url, platform).await {
                    warn!(url = %self.url, error = %e, "failed to launch session");
                }
            }
            Ok(_) => debug!(url = %self.url, "stream not live"),
            Err(e) if e.is_expected() => debug!(url = %self.url, error = %e, "liveness probe"),
            Err(e) => warn!(url = %self.url, error = %e, "liveness probe failed"),
        }
    }
}
