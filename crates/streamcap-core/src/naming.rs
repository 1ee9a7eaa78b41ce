//! Destination naming: sanitized path segments, folder policy, save paths.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::command::OutputFormat;
use crate::config::FolderPolicy;
use crate::resolver::StreamInfo;

const TITLE_MAX_CHARS: usize = 30;
const FALLBACK_DIR_NAME: &str = "streamcap_downloads";

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[/\\:\*\?？"<>\|&#\.。,，\s~！·]"#).expect("valid sanitize pattern")
    })
}

fn repeated_separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_+").expect("valid separator pattern"))
}

/// Strip path-unsafe and non-filename-safe characters, collapse repeated
/// separators. Falls back to `default` when nothing survives.
pub fn sanitize_name(name: &str, default: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return default.to_string();
    }
    let normalized = trimmed.replace('（', "(").replace('）', ")");
    let replaced = unsafe_chars().replace_all(&normalized, "_");
    let collapsed = repeated_separators().replace_all(&replaced, "_");
    let cleaned = collapsed.trim_matches('_');
    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Truncate a title to 30 chars (char-boundary safe), normalizing fullwidth
/// commas and dropping spaces.
pub fn clean_title(title: &str) -> String {
    title
        .chars()
        .take(TITLE_MAX_CHARS)
        .map(|c| if c == '，' { ',' } else { c })
        .filter(|c| *c != ' ')
        .collect()
}

/// Compose the destination directory from the policy toggles.
///
/// `date` is `YYYYMMDD`. The title folder combines with the date as
/// `YYYYMMDD_title` when the date folder itself is disabled.
pub fn output_dir(root: &Path, policy: &FolderPolicy, info: &StreamInfo, date: &str) -> PathBuf {
    let mut dir = root.to_path_buf();

    if policy.platform {
        dir.push(sanitize_name(&info.platform, "other"));
    }
    if policy.author {
        let author = clean_title(&sanitize_name(&info.anchor_name, ""));
        dir.push(if author.is_empty() {
            "broadcaster".to_string()
        } else {
            author
        });
    }
    if policy.date {
        dir.push(date);
    }
    if policy.title {
        let title = clean_title(&sanitize_name(&info.title, ""));
        if !title.is_empty() {
            if policy.date {
                dir.push(title);
            } else {
                dir.push(format!("{date}_{title}"));
            }
        }
    }
    dir
}

/// Create the directory and probe it for writability; on failure fall back
/// to a process-wide temp directory instead of failing the session.
pub fn ensure_writable(dir: &Path) -> PathBuf {
    match try_writable(dir) {
        Ok(()) => dir.to_path_buf(),
        Err(e) => {
            let fallback = std::env::temp_dir().join(FALLBACK_DIR_NAME);
            warn!(
                dir = %dir.display(),
                fallback = %fallback.display(),
                error = %e,
                "destination not writable, using fallback directory"
            );
            let _ = fs::create_dir_all(&fallback);
            fallback
        }
    }
}

fn try_writable(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(".write_probe");
    fs::write(&probe, b"probe")?;
    fs::remove_file(&probe)
}

/// Filename stem: `anchor[_title]_timestamp`, spaces replaced by `_`.
pub fn capture_filename(info: &StreamInfo, include_title: bool, timestamp: &str) -> String {
    let anchor = sanitize_name(&info.anchor_name, "broadcaster");
    let title = if include_title {
        let cleaned = clean_title(&sanitize_name(&info.title, ""));
        (!cleaned.is_empty()).then_some(cleaned)
    } else {
        None
    };

    let mut parts = vec![anchor];
    if let Some(title) = title {
        parts.push(title);
    }
    parts.push(timestamp.to_string());
    parts.join("_").replace(' ', "_")
}

/// Full save path; segmenting gets a printf-style numeric suffix so ffmpeg's
/// segment muxer numbers the files.
pub fn save_path(dir: &Path, stem: &str, format: OutputFormat, segment: bool) -> PathBuf {
    let suffix = if segment && format.is_segmentable() {
        format!("{stem}_%03d.{}", format.extension())
    } else {
        format!("{stem}.{}", format.extension())
    };
    dir.join(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn info(anchor: &str, title: &str, platform: &str) -> StreamInfo {
        StreamInfo {
            is_live: true,
            record_url: "https://cdn.example/x.flv".into(),
            anchor_name: anchor.into(),
            title: title.into(),
            platform: platform.into(),
        }
    }

    #[test]
    fn test_sanitize_strips_unsafe_chars() {
        assert_eq!(sanitize_name("a/b\\c:d*e?f", "x"), "a_b_c_d_e_f");
        assert_eq!(sanitize_name("hello world", "x"), "hello_world");
        assert_eq!(sanitize_name("（别名）", "x"), "(别名)");
    }

    #[test]
    fn test_sanitize_collapses_separators() {
        assert_eq!(sanitize_name("a?? ??b", "x"), "a_b");
        assert_eq!(sanitize_name("__a__", "x"), "a");
    }

    #[test]
    fn test_sanitize_falls_back_to_default() {
        assert_eq!(sanitize_name("", "直播间"), "直播间");
        assert_eq!(sanitize_name("???", "other"), "other");
        assert_eq!(sanitize_name("   ", "other"), "other");
    }

    #[test]
    fn test_clean_title_truncates_to_30_chars() {
        let long: String = "标".repeat(40);
        assert_eq!(clean_title(&long).chars().count(), 30);
        assert_eq!(clean_title("a，b c"), "a,bc");
    }

    #[test]
    fn test_each_folder_toggle_changes_one_segment() {
        let root = Path::new("/data");
        let stream = info("anchor", "title", "douyin");
        let all_off = FolderPolicy {
            platform: false,
            author: false,
            date: false,
            title: false,
            filename_includes_title: true,
        };
        let base_depth = output_dir(root, &all_off, &stream, "20260825")
            .components()
            .count();

        for (platform, author, date, title) in [
            (true, false, false, false),
            (false, true, false, false),
            (false, false, true, false),
            (false, false, false, true),
        ] {
            let policy = FolderPolicy {
                platform,
                author,
                date,
                title,
                filename_includes_title: true,
            };
            let depth = output_dir(root, &policy, &stream, "20260825")
                .components()
                .count();
            assert_eq!(depth, base_depth + 1, "policy {policy:?}");
        }
    }

    #[test]
    fn test_title_folder_merges_date_when_date_folder_off() {
        let root = Path::new("/data");
        let stream = info("anchor", "night stream", "douyin");
        let policy = FolderPolicy {
            platform: false,
            author: false,
            date: false,
            title: true,
            filename_includes_title: true,
        };
        let dir = output_dir(root, &policy, &stream, "20260825");
        assert_eq!(dir, PathBuf::from("/data/20260825_night_stream"));
    }

    #[test]
    fn test_default_policy_layout() {
        let root = Path::new("/data");
        let stream = info("主播A", "t", "douyin");
        let dir = output_dir(root, &FolderPolicy::default(), &stream, "20260825");
        assert_eq!(dir, PathBuf::from("/data/douyin/主播A/20260825"));
    }

    #[test]
    fn test_capture_filename_order() {
        let stream = info("Anchor A", "My Title That Is Quite Long Indeed Yes", "douyin");
        let name = capture_filename(&stream, true, "2026-08-25_10-00-00");
        let anchor_pos = name.find("Anchor_A").unwrap();
        let title_pos = name.rfind("My_Title").unwrap();
        let ts_pos = name.find("2026-08-25").unwrap();
        assert!(anchor_pos < title_pos && title_pos < ts_pos);
        assert!(!name.contains(' '));
    }

    #[test]
    fn test_capture_filename_title_excluded() {
        let stream = info("A", "T", "douyin");
        let name = capture_filename(&stream, false, "2026-08-25_10-00-00");
        assert_eq!(name, "A_2026-08-25_10-00-00");
    }

    #[test]
    fn test_capture_filename_truncates_title() {
        let stream = info("A", &"x".repeat(50), "douyin");
        let name = capture_filename(&stream, true, "ts");
        assert_eq!(name, format!("A_{}_ts", "x".repeat(30)));
    }

    #[test]
    fn test_save_path_segment_pattern() {
        let dir = Path::new("/out");
        assert_eq!(
            save_path(dir, "cap", OutputFormat::Ts, true),
            PathBuf::from("/out/cap_%03d.ts")
        );
        assert_eq!(
            save_path(dir, "cap", OutputFormat::Ts, false),
            PathBuf::from("/out/cap.ts")
        );
        // FLV cannot segment, so it never gets the pattern.
        assert_eq!(
            save_path(dir, "cap", OutputFormat::Flv, true),
            PathBuf::from("/out/cap.flv")
        );
    }

    #[test]
    fn test_ensure_writable_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let ok = ensure_writable(dir.path());
        assert_eq!(ok, dir.path());

        let bad = Path::new("/proc/streamcap-cannot-write-here");
        let fallback = ensure_writable(bad);
        assert_ne!(fallback, bad);
        assert!(fallback.ends_with(FALLBACK_DIR_NAME));
    }

    proptest! {
        #[test]
        fn prop_sanitized_names_are_path_safe(name in ".{0,64}") {
            let cleaned = sanitize_name(&name, "fallback");
            prop_assert!(!cleaned.is_empty());
            for forbidden in ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '] {
                prop_assert!(!cleaned.contains(forbidden));
            }
            prop_assert!(!cleaned.starts_with('_'));
            prop_assert!(!cleaned.ends_with('_'));
        }
    }
}
