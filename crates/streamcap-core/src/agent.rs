//! The recorder agent: one process, one status record, and the control loop
//! that ties sessions and monitors to the cross-process stop flag.
//!
//! The agent republishes its status record once per poll interval and
//! watches the `stop_requested` flag external tooling may flip. Storage
//! errors in that loop are logged and swallowed; a full status directory
//! must never take down a running capture.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use streamcap_ipc::{StatusRecord, StatusStore};

use crate::config::RecorderConfig;
use crate::monitor::{Monitor, SessionLauncher};
use crate::resolver::{HelperResolver, ResolverRegistry};
use crate::session::{RecordingSession, SessionState};
use crate::shutdown::ShutdownToken;

/// Hosts zero-or-one monitor loop and zero-or-one recording session.
pub struct RecorderAgent {
    config: RecorderConfig,
    registry: Arc<ResolverRegistry>,
    shutdown: ShutdownToken,
}

impl RecorderAgent {
    /// Agent backed by the configured external resolver helper.
    pub fn new(config: RecorderConfig) -> Self {
        let resolver = Arc::new(
            HelperResolver::new(&config.resolver_program)
                .with_proxy(config.proxy.clone())
                .with_cookies_file(config.cookies_file.clone()),
        );
        let registry = Arc::new(ResolverRegistry::with_known_platforms(resolver));
        Self::with_registry(config, registry)
    }

    /// Agent with a caller-supplied resolver registry.
    pub fn with_registry(config: RecorderConfig, registry: Arc<ResolverRegistry>) -> Self {
        Self {
            config,
            registry,
            shutdown: ShutdownToken::new(),
        }
    }

    /// The token signal handlers should trigger for graceful shutdown.
    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Record one stream now, single-shot. Publishes a status record for the
    /// lifetime of the session and deletes it on the way out.
    pub async fn record(&self, url: &str) -> crate::Result<Vec<PathBuf>> {
        let store = StatusStore::create(&self.config.status_dir);
        info!(url, instance = store.instance_id(), "recording");

        let (platform, resolver) = self.registry.resolver_for(url);
        let session = RecordingSession::new(
            self.config.clone(),
            resolver,
            url,
            platform,
            self.shutdown.clone(),
        );
        let states = session.subscribe();
        let mut handle = tokio::spawn(session.run());

        let mut record = StatusRecord::new(std::process::id());
        record.monitor_url = Some(url.to_string());

        let result = loop {
            record.is_recording = states.borrow().is_active();
            self.publish_and_check_stop(&store, &mut record);

            tokio::select! {
                result = &mut handle => {
                    break result.unwrap_or_else(|e| {
                        Err(crate::RecordError::Io(std::io::Error::other(format!(
                            "session task failed: {e}"
                        ))))
                    });
                }
                _ = tokio::time::sleep(self.config.status_interval) => {}
            }
        };

        if let Err(e) = store.delete() {
            warn!(error = %e, "failed to remove status record");
        }
        result
    }

    /// Monitor a room URL until stopped, recording whenever it is live.
    pub async fn monitor(&self, url: &str) -> crate::Result<()> {
        let store = StatusStore::create(&self.config.status_dir);
        info!(url, instance = store.instance_id(), "monitoring");

        let launcher = Arc::new(AgentLauncher {
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            shutdown: self.shutdown.clone(),
            sessions: Mutex::new(HashMap::new()),
        });
        let monitor = Monitor::new(
            url,
            self.config.quality,
            self.config.monitor_interval,
            Arc::clone(&self.registry),
            Arc::clone(&launcher) as Arc<dyn SessionLauncher>,
            self.shutdown.clone(),
        );
        let mut handle = tokio::spawn(monitor.run());

        let mut record = StatusRecord::new(std::process::id());
        record.monitor_url = Some(url.to_string());
        record.is_monitoring = true;

        loop {
            record.is_recording = launcher.any_active();
            self.publish_and_check_stop(&store, &mut record);

            tokio::select! {
                _ = &mut handle => break,
                _ = tokio::time::sleep(self.config.status_interval) => {}
            }
        }

        // The monitor has exited; sessions share the shutdown token, so wait
        // for the last capture to finish its stop sequence.
        record.is_monitoring = false;
        while launcher.any_active() {
            record.is_recording = true;
            self.publish_and_check_stop(&store, &mut record);
            tokio::time::sleep(self.config.status_interval).await;
        }

        if let Err(e) = store.delete() {
            warn!(error = %e, "failed to remove status record");
        }
        Ok(())
    }

    /// One control-loop tick: observe the external stop flag, republish.
    ///
    /// The flag is ORed into the outgoing record, never assigned, so a flip
    /// observed once survives every later republish.
    fn publish_and_check_stop(&self, store: &StatusStore, record: &mut StatusRecord) {
        match store.load() {
            Ok(existing) => {
                if existing.stop_requested && !record.stop_requested {
                    info!("stop requested via status record");
                }
                record.stop_requested |= existing.stop_requested;
            }
            Err(streamcap_ipc::StoreError::NotFound(_)) => {}
            Err(e) => debug!(error = %e, "could not read back status record"),
        }
        if record.stop_requested {
            self.shutdown.trigger();
        }
        record.touch();
        if let Err(e) = store.publish(record) {
            debug!(error = %e, "could not publish status record");
        }
    }
}

/// Launches real recording sessions for the monitor loop and remembers which
/// URLs still have one active.
struct AgentLauncher {
    config: RecorderConfig,
    registry: Arc<ResolverRegistry>,
    shutdown: ShutdownToken,
    sessions: Mutex<HashMap<String, watch::Receiver<SessionState>>>,
}

impl AgentLauncher {
    fn any_active(&self) -> bool {
        let mut sessions = self.lock_sessions();
        sessions.retain(|_, states| {
            let state = *states.borrow();
            state.is_active() || state == SessionState::Idle
        });
        !sessions.is_empty()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, watch::Receiver<SessionState>>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionLauncher for AgentLauncher {
    fn is_active(&self, url: &str) -> bool {
        let mut sessions = self.lock_sessions();
        match sessions.get(url) {
            Some(states) => {
                let state = *states.borrow();
                if state.is_active() || state == SessionState::Idle {
                    true
                } else {
                    sessions.remove(url);
                    false
                }
            }
            None => false,
        }
    }

    async fn launch(&self, url: &str, platform: &'static str) -> crate::Result<()> {
        let (_, resolver) = self.registry.resolver_for(url);
        let session = RecordingSession::new(
            self.config.clone(),
            resolver,
            url,
            platform,
            self.shutdown.clone(),
        );
        let states = session.subscribe();
        self.lock_sessions().insert(url.to_string(), states);

        let session_url = url.to_string();
        tokio::spawn(async move {
            if let Err(e) = session.run().await {
                if e.is_expected() {
                    debug!(url = %session_url, error = %e, "session ended");
                } else {
                    warn!(url = %session_url, error = %e, "session ended with error");
                }
            }
        });
        Ok(())
    }
}
