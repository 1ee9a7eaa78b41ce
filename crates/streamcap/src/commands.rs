use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
pub use clap_complete::Shell;

use streamcap_core::{OutputFormat, Quality};

const LONG_ABOUT: &str = r#"streamcap records live streams to disk.

WORKFLOW:
    1. `streamcap record <url>` captures a stream that is live right now
    2. `streamcap monitor <url>` polls a room and records whenever it goes live
    3. `streamcap list` shows every recorder running on this host
    4. `streamcap stop` asks one (or all) of them to finish up and exit

Recorders publish a small status file per instance in a shared directory
(STREAMCAP_STATUS_DIR, defaults to the system temp dir), so `list` and
`stop` work from any shell, against recorders started anywhere.

Stream resolution is delegated to an external helper executable
(STREAMCAP_RESOLVER) that turns a room URL into a playable media URL.

EXAMPLES:
    streamcap record https://live.douyin.com/123456
    streamcap monitor -i 30 https://www.tiktok.com/@user/live
    streamcap record -f ts --segment-time 600 https://live.douyin.com/1
    streamcap list
    streamcap stop --url douyin.com/123456
    streamcap stop --all"#;

#[derive(Parser)]
#[command(name = "streamcap")]
#[command(author, version)]
#[command(about = "Record live streams, on demand or on a monitor loop")]
#[command(long_about = LONG_ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record a stream that is live right now, single-shot
    #[command(long_about = r#"Record a stream that is live right now.

Resolves the room URL, spawns one capture subprocess, and blocks until the
stream ends or a stop arrives (Ctrl-C, SIGTERM, or `streamcap stop`).
Exits with an error if the stream is not live.

EXAMPLES:
    streamcap record https://live.douyin.com/123456
    streamcap record -f ts -q hd https://live.douyin.com/123456
    streamcap record --no-segment -o /srv/captures https://live.douyin.com/1"#)]
    Record {
        #[command(flatten)]
        capture: CaptureArgs,
    },

    /// Poll a room URL and record every time it goes live
    #[command(long_about = r#"Poll a room URL and record every time it goes live.

Runs until stopped. While a capture is in progress the poll cycle is
skipped, so a long stream is never double-recorded.

EXAMPLES:
    streamcap monitor https://live.douyin.com/123456
    streamcap monitor -i 30 https://www.tiktok.com/@user/live"#)]
    Monitor {
        /// Seconds between liveness checks
        #[arg(short = 'i', long, default_value = "60")]
        interval: u64,

        #[command(flatten)]
        capture: CaptureArgs,
    },

    /// List active recorders on this host
    #[command(name = "list")]
    List {
        /// Also remove records whose owning process is gone
        #[arg(long)]
        prune: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask running recorders to stop gracefully
    #[command(long_about = r#"Ask running recorders to stop gracefully.

Flips the stop flag in the targeted status record(s). The owning recorder
notices within about a second, finishes its capture cleanly, and exits.

Ordinals come from `streamcap list` and are best-effort: they can shift if
recorders start or stop between the listing and this command.

EXAMPLES:
    streamcap stop --id 1
    streamcap stop --url douyin.com/123456
    streamcap stop --all"#)]
    Stop {
        /// Ordinal from `streamcap list`
        #[arg(long, conflicts_with_all = ["url", "all"])]
        id: Option<usize>,

        /// Substring of the monitored URL; may match several recorders
        #[arg(long, conflicts_with = "all")]
        url: Option<String>,

        /// Stop every recorder on this host
        #[arg(long)]
        all: bool,
    },

    /// Generate shell completion scripts
    #[command(long_about = r#"Generate shell completion scripts.

EXAMPLES:
    source <(streamcap completions bash)
    streamcap completions fish > ~/.config/fish/completions/streamcap.fish"#)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by `record` and `monitor`.
#[derive(Debug, Clone, Parser)]
pub struct CaptureArgs {
    /// Room URL (e.g. https://live.douyin.com/123456)
    pub url: String,

    /// Root directory for recordings
    #[arg(short = 'o', long, env = "STREAMCAP_OUTPUT_DIR")]
    pub output: Option<PathBuf>,

    /// Output container: mp4, flv, or ts
    #[arg(short = 'f', long, default_value = "mp4")]
    pub format: OutputFormat,

    /// Stream quality to request: od, hd, sd, or ld
    #[arg(short = 'q', long, default_value = "od")]
    pub quality: Quality,

    /// Write one continuous file instead of timed segments
    #[arg(long)]
    pub no_segment: bool,

    /// Segment length in seconds
    #[arg(long, default_value = "1800")]
    pub segment_time: u32,

    /// HTTP proxy for the capture subprocess and the resolver
    #[arg(short = 'p', long, env = "STREAMCAP_PROXY")]
    pub proxy: Option<String>,

    /// Cookies file passed to the resolver
    #[arg(short = 'c', long)]
    pub cookies: Option<PathBuf>,

    /// Use the higher-latency network tuning profile
    #[arg(long)]
    pub overseas: bool,

    /// Rewrite plain-http playable URLs to https
    #[arg(long)]
    pub force_https: bool,

    /// Command run on each finished file; {file} and {dir} are expanded
    #[arg(long)]
    pub script: Option<String>,

    /// Capture program to use
    #[arg(long, env = "STREAMCAP_FFMPEG")]
    pub ffmpeg: Option<String>,

    /// Resolver helper executable
    #[arg(long, env = "STREAMCAP_RESOLVER")]
    pub resolver: Option<String>,

    /// Skip the per-platform directory level
    #[arg(long)]
    pub no_platform_folder: bool,

    /// Skip the per-broadcaster directory level
    #[arg(long)]
    pub no_author_folder: bool,

    /// Skip the per-day directory level
    #[arg(long)]
    pub no_date_folder: bool,

    /// Add a per-title directory level
    #[arg(long)]
    pub title_folder: bool,

    /// Leave the stream title out of file names
    #[arg(long)]
    pub no_include_title: bool,
}

impl CaptureArgs {
    /// Fold the flags into a recorder configuration, starting from the
    /// environment-derived defaults.
    pub fn to_config(&self) -> streamcap_core::RecorderConfig {
        use streamcap_core::{FolderPolicy, RecorderConfig};

        let mut config = RecorderConfig::from_env()
            .with_format(self.format)
            .with_quality(self.quality)
            .with_segmenting(!self.no_segment, self.segment_time)
            .with_overseas(self.overseas)
            .with_post_command(self.script.clone())
            .with_folder_policy(FolderPolicy {
                platform: !self.no_platform_folder,
                author: !self.no_author_folder,
                date: !self.no_date_folder,
                title: self.title_folder,
                filename_includes_title: !self.no_include_title,
            });
        if let Some(output) = &self.output {
            config = config.with_output_dir(output);
        }
        if self.proxy.is_some() {
            config = config.with_proxy(self.proxy.clone());
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config = config.with_ffmpeg_program(ffmpeg);
        }
        if let Some(resolver) = &self.resolver {
            config = config.with_resolver_program(resolver);
        }
        config.cookies_file = self.cookies.clone();
        config.force_https = self.force_https;
        config
    }
}
