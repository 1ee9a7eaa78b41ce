//! FFmpeg argument construction.
//!
//! Pure mapping from recording options to the exact subprocess argument
//! vector. No I/O happens here; an unsupported format is rejected when the
//! format string is parsed, before any process can be spawned.

use std::fmt;
use std::str::FromStr;

use crate::error::RecordError;

/// Output container for a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Mp4,
    Flv,
    Ts,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Flv => "flv",
            OutputFormat::Ts => "ts",
        }
    }

    /// FLV is a single-stream container; the segment muxer cannot split it.
    pub fn is_segmentable(&self) -> bool {
        !matches!(self, OutputFormat::Flv)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(OutputFormat::Mp4),
            "flv" => Ok(OutputFormat::Flv),
            "ts" => Ok(OutputFormat::Ts),
            other => Err(RecordError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Input-tuning constants for one network profile.
#[derive(Debug, Clone, Copy)]
pub struct NetworkProfile {
    pub rw_timeout: &'static str,
    pub analyzeduration: &'static str,
    pub probesize: &'static str,
    pub bufsize: &'static str,
    pub max_muxing_queue_size: &'static str,
}

/// Tuning for streams on the local network path.
pub const DEFAULT_PROFILE: NetworkProfile = NetworkProfile {
    rw_timeout: "15000000",
    analyzeduration: "20000000",
    probesize: "10000000",
    bufsize: "8000k",
    max_muxing_queue_size: "1024",
};

/// Higher-latency tuning for overseas streams; selection is caller-supplied.
pub const OVERSEAS_PROFILE: NetworkProfile = NetworkProfile {
    rw_timeout: "50000000",
    analyzeduration: "40000000",
    probesize: "20000000",
    bufsize: "15000k",
    max_muxing_queue_size: "2048",
};

const FFMPEG_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 11; SAMSUNG SM-G973U) \
     AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/14.2 \
     Chrome/87.0.4280.141 Mobile Safari/537.36";

const DOUYIN_HEADERS: &str = "user-agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/107.0.0.0 Safari/537.36\r\nreferer: https://live.douyin.com/\r\n";
const TIKTOK_HEADERS: &str = "user-agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/107.0.0.0 Safari/537.36\r\nreferer: https://www.tiktok.com/\r\n";

/// Header block some CDNs require, keyed by substrings of the playable URL.
pub fn default_headers_for(record_url: &str) -> Option<String> {
    if record_url.contains("douyin.com") || record_url.contains("douyincdn.com") {
        Some(DOUYIN_HEADERS.to_string())
    } else if record_url.contains("tiktok.com") {
        Some(TIKTOK_HEADERS.to_string())
    } else {
        None
    }
}

/// Builds the full argument vector for one capture subprocess.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    record_url: String,
    format: OutputFormat,
    save_path: String,
    overseas: bool,
    segment: bool,
    segment_seconds: u32,
    headers: Option<String>,
    proxy: Option<String>,
}

impl CommandBuilder {
    pub fn new(
        program: impl Into<String>,
        record_url: impl Into<String>,
        format: OutputFormat,
        save_path: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            record_url: record_url.into(),
            format,
            save_path: save_path.into(),
            overseas: false,
            segment: false,
            segment_seconds: 1800,
            headers: None,
            proxy: None,
        }
    }

    pub fn overseas(mut self, overseas: bool) -> Self {
        self.overseas = overseas;
        self
    }

    pub fn segment(mut self, enabled: bool, seconds: u32) -> Self {
        self.segment = enabled;
        self.segment_seconds = seconds;
        self
    }

    pub fn headers(mut self, headers: Option<String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Produce the deterministic argument vector, program name first.
    pub fn build(&self) -> Vec<String> {
        let profile = if self.overseas {
            OVERSEAS_PROFILE
        } else {
            DEFAULT_PROFILE
        };

        let mut argv: Vec<String> = vec![self.program.clone()];

        // ffmpeg resolves -http_proxy per input; it has to come before the
        // input-tuning flags to apply to the stream open.
        if let Some(proxy) = &self.proxy {
            argv.push("-http_proxy".into());
            argv.push(proxy.clone());
        }

        argv.extend(
            [
                "-y",
                "-v",
                "verbose",
                "-rw_timeout",
                profile.rw_timeout,
                "-loglevel",
                "error",
                "-hide_banner",
                "-user_agent",
                FFMPEG_USER_AGENT,
            ]
            .map(String::from),
        );

        if let Some(headers) = &self.headers {
            argv.push("-headers".into());
            argv.push(headers.clone());
        }

        argv.extend(
            [
                "-protocol_whitelist",
                "rtmp,crypto,file,http,https,tcp,tls,udp,rtp,httpproxy",
                "-thread_queue_size",
                "1024",
                "-analyzeduration",
                profile.analyzeduration,
                "-probesize",
                profile.probesize,
                "-fflags",
                "+discardcorrupt",
                "-re",
                "-i",
            ]
            .map(String::from),
        );
        argv.push(self.record_url.clone());
        argv.extend(
            [
                "-bufsize",
                profile.bufsize,
                "-sn",
                "-dn",
                "-reconnect_delay_max",
                "60",
                "-reconnect_streamed",
                "-reconnect_at_eof",
                "-max_muxing_queue_size",
                profile.max_muxing_queue_size,
                "-correct_ts_overflow",
                "1",
                "-avoid_negative_ts",
                "1",
            ]
            .map(String::from),
        );

        self.append_output_args(&mut argv);
        argv
    }

    fn append_output_args(&self, argv: &mut Vec<String>) {
        let segmenting = self.segment && self.format.is_segmentable();
        let segment_time = self.segment_seconds.to_string();

        match self.format {
            OutputFormat::Mp4 if segmenting => argv.extend(
                [
                    "-c:v",
                    "copy",
                    "-c:a",
                    "aac",
                    "-map",
                    "0",
                    "-f",
                    "segment",
                    "-segment_time",
                    &segment_time,
                    "-segment_format",
                    "mp4",
                    "-reset_timestamps",
                    "1",
                    "-movflags",
                    "+frag_keyframe+empty_moov",
                    "-flags",
                    "global_header",
                ]
                .map(String::from),
            ),
            OutputFormat::Mp4 => argv.extend(
                ["-map", "0", "-c:v", "copy", "-c:a", "copy", "-f", "mp4"].map(String::from),
            ),
            OutputFormat::Flv => argv.extend(
                [
                    "-map",
                    "0",
                    "-c:v",
                    "copy",
                    "-c:a",
                    "copy",
                    "-bsf:a",
                    "aac_adtstoasc",
                    "-flvflags",
                    "no_duration_filesize",
                    "-f",
                    "flv",
                ]
                .map(String::from),
            ),
            OutputFormat::Ts if segmenting => argv.extend(
                [
                    "-c:v",
                    "copy",
                    "-c:a",
                    "copy",
                    "-map",
                    "0",
                    "-f",
                    "segment",
                    "-segment_time",
                    &segment_time,
                    "-segment_format",
                    "mpegts",
                    "-mpegts_flags",
                    "+resend_headers",
                    "-reset_timestamps",
                    "1",
                ]
                .map(String::from),
            ),
            OutputFormat::Ts => argv.extend(
                [
                    "-map",
                    "0",
                    "-c:v",
                    "copy",
                    "-c:a",
                    "copy",
                    "-f",
                    "mpegts",
                    "-mpegts_flags",
                    "+resend_headers",
                ]
                .map(String::from),
            ),
        }

        argv.push(self.save_path.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://cdn.example/stream.flv";

    fn builder(format: OutputFormat) -> CommandBuilder {
        CommandBuilder::new("ffmpeg", URL, format, "/tmp/out.dat")
    }

    #[test]
    fn test_url_appears_exactly_once() {
        for format in [OutputFormat::Mp4, OutputFormat::Flv, OutputFormat::Ts] {
            let argv = builder(format).build();
            assert_eq!(argv.iter().filter(|a| a.as_str() == URL).count(), 1);
        }
    }

    #[test]
    fn test_destination_is_last_argument() {
        for format in [OutputFormat::Mp4, OutputFormat::Flv, OutputFormat::Ts] {
            let argv = builder(format).segment(true, 60).build();
            assert_eq!(argv.last().unwrap(), "/tmp/out.dat");
            assert_eq!(
                argv.iter().filter(|a| a.as_str() == "/tmp/out.dat").count(),
                1
            );
        }
    }

    #[test]
    fn test_no_proxy_flags_without_proxy() {
        let argv = builder(OutputFormat::Mp4).build();
        assert!(!argv.iter().any(|a| a == "-http_proxy"));
    }

    #[test]
    fn test_proxy_injected_right_after_program() {
        let argv = builder(OutputFormat::Mp4)
            .proxy(Some("http://127.0.0.1:7890".into()))
            .build();
        assert_eq!(argv[1], "-http_proxy");
        assert_eq!(argv[2], "http://127.0.0.1:7890");
    }

    #[test]
    fn test_headers_follow_user_agent() {
        let argv = builder(OutputFormat::Mp4)
            .headers(Some("referer: https://example.com/\r\n".into()))
            .build();
        let ua = argv.iter().position(|a| a == "-user_agent").unwrap();
        assert_eq!(argv[ua + 2], "-headers");
        assert_eq!(argv[ua + 3], "referer: https://example.com/\r\n");
    }

    #[test]
    fn test_overseas_profile_constants() {
        let argv = builder(OutputFormat::Mp4).overseas(true).build();
        let rw = argv.iter().position(|a| a == "-rw_timeout").unwrap();
        assert_eq!(argv[rw + 1], "50000000");
        let buf = argv.iter().position(|a| a == "-bufsize").unwrap();
        assert_eq!(argv[buf + 1], "15000k");
    }

    #[test]
    fn test_mp4_segmenting_uses_segment_muxer() {
        let argv = builder(OutputFormat::Mp4).segment(true, 900).build();
        let f = argv.iter().position(|a| a == "-f").unwrap();
        assert_eq!(argv[f + 1], "segment");
        let st = argv.iter().position(|a| a == "-segment_time").unwrap();
        assert_eq!(argv[st + 1], "900");
        assert!(argv.iter().any(|a| a == "+frag_keyframe+empty_moov"));
    }

    #[test]
    fn test_mp4_single_file() {
        let argv = builder(OutputFormat::Mp4).build();
        assert!(!argv.iter().any(|a| a == "segment"));
        let f = argv.iter().rposition(|a| a == "-f").unwrap();
        assert_eq!(argv[f + 1], "mp4");
    }

    #[test]
    fn test_flv_ignores_segmenting() {
        let argv = builder(OutputFormat::Flv).segment(true, 60).build();
        assert!(!argv.iter().any(|a| a == "segment"));
        assert!(argv.iter().any(|a| a == "aac_adtstoasc"));
        assert!(argv.iter().any(|a| a == "no_duration_filesize"));
    }

    #[test]
    fn test_ts_variants() {
        let single = builder(OutputFormat::Ts).build();
        assert!(single.iter().any(|a| a == "mpegts"));
        assert!(single.iter().any(|a| a == "+resend_headers"));

        let split = builder(OutputFormat::Ts).segment(true, 120).build();
        let f = split.iter().position(|a| a == "-f").unwrap();
        assert_eq!(split[f + 1], "segment");
        assert!(split.iter().any(|a| a == "mpegts"));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("MP4".parse::<OutputFormat>().unwrap(), OutputFormat::Mp4);
        assert_eq!("flv".parse::<OutputFormat>().unwrap(), OutputFormat::Flv);
        assert_eq!("ts".parse::<OutputFormat>().unwrap(), OutputFormat::Ts);
        assert!(matches!(
            "mkv".parse::<OutputFormat>(),
            Err(RecordError::UnsupportedFormat(f)) if f == "mkv"
        ));
    }

    #[test]
    fn test_default_headers_by_platform() {
        assert!(
            default_headers_for("https://pull.douyincdn.com/x.flv")
                .unwrap()
                .contains("live.douyin.com")
        );
        assert!(
            default_headers_for("https://pull.tiktok.com/x.flv")
                .unwrap()
                .contains("www.tiktok.com")
        );
        assert!(default_headers_for("https://cdn.bilivideo.cn/x.flv").is_none());
    }
}
