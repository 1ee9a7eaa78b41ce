use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::command::OutputFormat;
use crate::resolver::Quality;

const DEFAULT_OUTPUT_DIR: &str = "downloads";
const DEFAULT_SEGMENT_SECONDS: u32 = 1800;
const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 60;
const DEFAULT_STATUS_INTERVAL_SECS: u64 = 1;
const DEFAULT_GRACE_SECS: u64 = 10;
const DEFAULT_FFMPEG_PROGRAM: &str = "ffmpeg";
const DEFAULT_RESOLVER_PROGRAM: &str = "streamcap-resolver";

/// Which optional path segments the destination directory gets, and whether
/// the cleaned title goes into the filename.
#[derive(Debug, Clone, Copy)]
pub struct FolderPolicy {
    pub platform: bool,
    pub author: bool,
    pub date: bool,
    pub title: bool,
    pub filename_includes_title: bool,
}

impl Default for FolderPolicy {
    fn default() -> Self {
        Self {
            platform: true,
            author: true,
            date: true,
            title: false,
            filename_includes_title: true,
        }
    }
}

/// Configuration for one recorder instance.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    pub quality: Quality,
    pub segment: bool,
    pub segment_seconds: u32,
    pub proxy: Option<String>,
    pub cookies_file: Option<PathBuf>,
    pub overseas: bool,
    pub force_https: bool,
    pub folder_policy: FolderPolicy,
    pub post_command: Option<String>,
    pub monitor_interval: Duration,
    pub status_interval: Duration,
    pub graceful_timeout: Duration,
    pub terminate_timeout: Duration,
    pub ffmpeg_program: String,
    pub resolver_program: String,
    pub status_dir: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RecorderConfig {
    pub fn from_env() -> Self {
        Self {
            output_dir: env::var_os("STREAMCAP_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            format: OutputFormat::Mp4,
            quality: Quality::Od,
            segment: true,
            segment_seconds: DEFAULT_SEGMENT_SECONDS,
            proxy: env::var("STREAMCAP_PROXY").ok(),
            cookies_file: None,
            overseas: false,
            force_https: false,
            folder_policy: FolderPolicy::default(),
            post_command: None,
            monitor_interval: Duration::from_secs(
                env::var("STREAMCAP_MONITOR_INTERVAL")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MONITOR_INTERVAL_SECS),
            ),
            status_interval: Duration::from_secs(
                env::var("STREAMCAP_STATUS_INTERVAL")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_STATUS_INTERVAL_SECS),
            ),
            graceful_timeout: Duration::from_secs(
                env::var("STREAMCAP_GRACE_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_GRACE_SECS),
            ),
            terminate_timeout: Duration::from_secs(DEFAULT_GRACE_SECS),
            ffmpeg_program: env::var("STREAMCAP_FFMPEG")
                .unwrap_or_else(|_| DEFAULT_FFMPEG_PROGRAM.to_string()),
            resolver_program: env::var("STREAMCAP_RESOLVER")
                .unwrap_or_else(|_| DEFAULT_RESOLVER_PROGRAM.to_string()),
            status_dir: streamcap_ipc::status_dir(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_segmenting(mut self, enabled: bool, seconds: u32) -> Self {
        self.segment = enabled;
        self.segment_seconds = seconds;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_overseas(mut self, overseas: bool) -> Self {
        self.overseas = overseas;
        self
    }

    pub fn with_folder_policy(mut self, policy: FolderPolicy) -> Self {
        self.folder_policy = policy;
        self
    }

    pub fn with_post_command(mut self, command: Option<String>) -> Self {
        self.post_command = command;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_grace_timeouts(mut self, graceful: Duration, terminate: Duration) -> Self {
        self.graceful_timeout = graceful;
        self.terminate_timeout = terminate;
        self
    }

    pub fn with_ffmpeg_program(mut self, program: impl Into<String>) -> Self {
        self.ffmpeg_program = program.into();
        self
    }

    pub fn with_resolver_program(mut self, program: impl Into<String>) -> Self {
        self.resolver_program = program.into();
        self
    }

    pub fn with_status_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.status_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecorderConfig::from_env();
        assert_eq!(config.format, OutputFormat::Mp4);
        assert_eq!(config.quality, Quality::Od);
        assert!(config.segment);
        assert_eq!(config.segment_seconds, DEFAULT_SEGMENT_SECONDS);
        assert_eq!(config.graceful_timeout, Duration::from_secs(DEFAULT_GRACE_SECS));
        assert_eq!(config.ffmpeg_program, DEFAULT_FFMPEG_PROGRAM);
    }

    #[test]
    fn test_default_folder_policy() {
        let policy = FolderPolicy::default();
        assert!(policy.platform);
        assert!(policy.author);
        assert!(policy.date);
        assert!(!policy.title);
        assert!(policy.filename_includes_title);
    }

    #[test]
    fn test_builder_pattern() {
        let config = RecorderConfig::from_env()
            .with_output_dir("/srv/captures")
            .with_format(OutputFormat::Ts)
            .with_quality(Quality::Hd)
            .with_segmenting(false, 600)
            .with_proxy(Some("http://127.0.0.1:7890".into()))
            .with_overseas(true)
            .with_monitor_interval(Duration::from_secs(5))
            .with_grace_timeouts(Duration::from_secs(3), Duration::from_secs(2))
            .with_ffmpeg_program("/opt/ffmpeg/bin/ffmpeg");

        assert_eq!(config.output_dir, PathBuf::from("/srv/captures"));
        assert_eq!(config.format, OutputFormat::Ts);
        assert_eq!(config.quality, Quality::Hd);
        assert!(!config.segment);
        assert_eq!(config.segment_seconds, 600);
        assert!(config.overseas);
        assert_eq!(config.monitor_interval, Duration::from_secs(5));
        assert_eq!(config.terminate_timeout, Duration::from_secs(2));
        assert_eq!(config.ffmpeg_program, "/opt/ffmpeg/bin/ffmpeg");
    }
}
