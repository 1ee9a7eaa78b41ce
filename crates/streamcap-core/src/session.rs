//! One recording session, from room URL to finished files on disk.
//!
//! The session is a linear state machine: resolve liveness, build the
//! destination and argument vector, supervise the capture subprocess, then
//! post-process. Cancellation arrives through the shutdown token and turns
//! into the orderly stop sequence instead of an error.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::command::{CommandBuilder, default_headers_for};
use crate::config::RecorderConfig;
use crate::error::RecordError;
use crate::naming;
use crate::postprocess::PostProcessor;
use crate::resolver::Resolver;
use crate::shutdown::ShutdownToken;
use crate::supervisor::CaptureProcess;

/// Where a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    BuildingCommand,
    Capturing,
    PostProcessing,
    Stopping,
    Completed,
    Failed,
}

impl SessionState {
    /// True while the session still owns resources (subprocess, files being
    /// written).
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Completed | SessionState::Failed)
    }

    /// True while a capture subprocess may be running.
    pub fn is_recording(&self) -> bool {
        matches!(
            self,
            SessionState::Capturing | SessionState::PostProcessing | SessionState::Stopping
        )
    }
}

/// A single capture of one stream.
pub struct RecordingSession {
    config: RecorderConfig,
    resolver: Arc<dyn Resolver>,
    url: String,
    platform_label: String,
    shutdown: ShutdownToken,
    state_tx: watch::Sender<SessionState>,
}

impl RecordingSession {
    pub fn new(
        config: RecorderConfig,
        resolver: Arc<dyn Resolver>,
        url: impl Into<String>,
        platform_label: impl Into<String>,
        shutdown: ShutdownToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            resolver,
            url: url.into(),
            platform_label: platform_label.into(),
            shutdown,
            state_tx,
        }
    }

    /// Observe state transitions from outside the session task.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run the session to completion. Returns the final files on disk; a
    /// stop request mid-capture still counts as success.
    pub async fn run(mut self) -> crate::Result<Vec<PathBuf>> {
        let result = self.run_inner().await;
        match &result {
            Ok(files) => {
                info!(url = %self.url, files = files.len(), "session completed");
                self.set_state(SessionState::Completed);
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "session failed");
                self.set_state(SessionState::Failed);
            }
        }
        result
    }

    async fn run_inner(&mut self) -> crate::Result<Vec<PathBuf>> {
        self.set_state(SessionState::Resolving);
        let info = self
            .resolver
            .resolve(&self.url, self.config.quality)
            .await?;
        if !info.is_live {
            return Err(RecordError::NotLive);
        }
        if self.shutdown.is_triggered() {
            debug!(url = %self.url, "shutdown before capture start");
            return Ok(Vec::new());
        }

        self.set_state(SessionState::BuildingCommand);
        let mut info = info;
        if info.platform.is_empty() {
            info.platform = self.platform_label.clone();
        }
        let record_url = if self.config.force_https {
            force_https(&info.record_url)
        } else {
            info.record_url.clone()
        };

        let now = Local::now();
        let dir = naming::output_dir(
            &self.config.output_dir,
            &self.config.folder_policy,
            &info,
            &now.format("%Y%m%d").to_string(),
        );
        let dir = naming::ensure_writable(&dir);
        let stem = naming::capture_filename(
            &info,
            self.config.folder_policy.filename_includes_title,
            &now.format("%Y-%m-%d_%H-%M-%S").to_string(),
        );
        let save_path = naming::save_path(&dir, &stem, self.config.format, self.config.segment);

        let argv = CommandBuilder::new(
            &self.config.ffmpeg_program,
            &record_url,
            self.config.format,
            save_path.to_string_lossy().to_string(),
        )
        .overseas(self.config.overseas)
        .segment(self.config.segment, self.config.segment_seconds)
        .headers(default_headers_for(&record_url))
        .proxy(self.config.proxy.clone())
        .build();

        self.set_state(SessionState::Capturing);
        info!(url = %self.url, save_path = %save_path.display(), "capture starting");
        let mut proc = CaptureProcess::spawn(&argv)?;

        let shutdown = self.shutdown.clone();
        tokio::select! {
            result = proc.wait() => result?,
            _ = shutdown.cancelled() => {
                self.set_state(SessionState::Stopping);
                let outcome = proc
                    .stop(self.config.graceful_timeout, self.config.terminate_timeout)
                    .await;
                info!(url = %self.url, ?outcome, "capture stopped on request");
            }
        }

        self.set_state(SessionState::PostProcessing);
        let processor = PostProcessor::new(
            self.config.ffmpeg_program.clone(),
            self.config.post_command.clone(),
        );
        Ok(processor
            .run(&save_path, self.config.format, self.config.segment)
            .await)
    }

    fn set_state(&self, state: SessionState) {
        debug!(url = %self.url, ?state, "session state");
        let _ = self.state_tx.send(state);
    }
}

/// Rewrite a plain-http playable URL to https, leaving anything else alone.
fn force_https(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}
