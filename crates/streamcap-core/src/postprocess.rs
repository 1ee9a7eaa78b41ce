//! Post-capture processing: mp4 remux and the user's custom command.
//!
//! Everything here is best-effort. A capture that finished recording never
//! fails because a remux or a user script failed; errors are logged and the
//! original files stay on disk.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::command::OutputFormat;
use crate::error::RecordError;

/// Runs after a capture session ends.
pub struct PostProcessor {
    ffmpeg_program: String,
    post_command: Option<String>,
}

impl PostProcessor {
    pub fn new(ffmpeg_program: impl Into<String>, post_command: Option<String>) -> Self {
        Self {
            ffmpeg_program: ffmpeg_program.into(),
            post_command,
        }
    }

    /// Process everything the capture produced and return the final files.
    ///
    /// Non-mp4 captures are remuxed to mp4 (stream copy, faststart) with the
    /// original deleted only when the remux succeeded; then the custom
    /// command, if any, runs once per file with `{file}`/`{dir}` expanded.
    pub async fn run(
        &self,
        save_path: &Path,
        format: OutputFormat,
        segmented: bool,
    ) -> Vec<PathBuf> {
        let produced = collect_produced_files(save_path, segmented && format.is_segmentable());
        if produced.is_empty() {
            warn!(path = %save_path.display(), "capture produced no files");
            return Vec::new();
        }

        let mut finals = Vec::with_capacity(produced.len());
        for file in produced {
            let file = if format == OutputFormat::Mp4 {
                file
            } else {
                match self.remux_to_mp4(&file).await {
                    Ok(remuxed) => remuxed,
                    Err(e) => {
                        warn!(file = %file.display(), error = %e, "remux failed, keeping original");
                        file
                    }
                }
            };
            if let Some(template) = &self.post_command {
                if let Err(e) = run_custom_command(template, &file).await {
                    warn!(file = %file.display(), error = %e, "post command failed");
                }
            }
            finals.push(file);
        }
        finals
    }

    async fn remux_to_mp4(&self, input: &Path) -> crate::Result<PathBuf> {
        let output = input.with_extension("mp4");
        debug!(input = %input.display(), output = %output.display(), "remuxing to mp4");

        let status = tokio::process::Command::new(&self.ffmpeg_program)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-c")
            .arg("copy")
            .arg("-movflags")
            .arg("+faststart")
            .arg(&output)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await
            .map_err(|e| RecordError::PostProcess(format!("{}: {e}", self.ffmpeg_program)))?;

        if !status.success() {
            return Err(RecordError::PostProcess(format!(
                "remux exited with {:?}",
                status.code()
            )));
        }
        // Drop the original only once the mp4 is known good.
        if let Err(e) = std::fs::remove_file(input) {
            warn!(file = %input.display(), error = %e, "could not remove remux source");
        }
        info!(output = %output.display(), "remuxed to mp4");
        Ok(output)
    }
}

/// Expand `{file}`/`{dir}` and run the command through the shell.
async fn run_custom_command(template: &str, file: &Path) -> crate::Result<()> {
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    let expanded = template
        .replace("{file}", &file.to_string_lossy())
        .replace("{dir}", &dir.to_string_lossy());

    info!(command = %expanded, "running post command");
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&expanded)
        .stdin(std::process::Stdio::null())
        .status()
        .await
        .map_err(|e| RecordError::PostProcess(format!("sh: {e}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(RecordError::PostProcess(format!(
            "post command exited with {:?}",
            status.code()
        )))
    }
}

/// Files the capture wrote. A plain path maps to itself; a segmented path
/// (`stem_%03d.ext`) expands to every numbered segment present on disk.
fn collect_produced_files(save_path: &Path, segmented: bool) -> Vec<PathBuf> {
    if !segmented {
        return if save_path.exists() {
            vec![save_path.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let Some((dir, name)) = save_path.parent().zip(save_path.file_name()) else {
        return Vec::new();
    };
    let name = name.to_string_lossy();
    let Some((prefix, suffix)) = name.split_once("%03d") else {
        return if save_path.exists() {
            vec![save_path.to_path_buf()]
        } else {
            Vec::new()
        };
    };

    let mut segments: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                let candidate = e.file_name();
                let candidate = candidate.to_string_lossy();
                candidate
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_suffix(suffix))
                    .is_some_and(|mid| mid.len() >= 3 && mid.bytes().all(|b| b.is_ascii_digit()))
            })
            .map(|e| e.path())
            .collect(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not scan for segment files");
            Vec::new()
        }
    };
    segments.sort();
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cap.mp4");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(collect_produced_files(&file, false), vec![file.clone()]);
        assert!(collect_produced_files(&dir.path().join("missing.mp4"), false).is_empty());
    }

    #[test]
    fn test_collect_segment_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["cap_001.ts", "cap_000.ts", "cap_002.ts", "other_000.ts", "cap_abc.ts"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let found = collect_produced_files(&dir.path().join("cap_%03d.ts"), true);
        assert_eq!(
            found,
            vec![
                dir.path().join("cap_000.ts"),
                dir.path().join("cap_001.ts"),
                dir.path().join("cap_002.ts"),
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_custom_command_expands_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cap.mp4");
        std::fs::write(&file, b"x").unwrap();

        run_custom_command("cp {file} {dir}/copied", &file).await.unwrap();
        assert!(dir.path().join("copied").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_custom_command_failure_is_post_process_error() {
        let err = run_custom_command("exit 7", Path::new("/tmp/x.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::PostProcess(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_remuxes_with_fake_ffmpeg() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        // Stand-in recorder: touch whatever output path it is given last.
        let fake = dir.path().join("fake-ffmpeg");
        std::fs::write(&fake, "#!/bin/sh\nfor a in \"$@\"; do out=\"$a\"; done\ntouch \"$out\"\n")
            .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let capture = dir.path().join("cap.ts");
        std::fs::write(&capture, b"x").unwrap();

        let processor = PostProcessor::new(fake.to_string_lossy().to_string(), None);
        let finals = processor.run(&capture, OutputFormat::Ts, false).await;
        assert_eq!(finals, vec![dir.path().join("cap.mp4")]);
        assert!(!capture.exists(), "remux source should be deleted");
        assert!(dir.path().join("cap.mp4").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_keeps_original_when_remux_fails() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("cap.ts");
        std::fs::write(&capture, b"x").unwrap();

        let processor = PostProcessor::new("false", None);
        let finals = processor.run(&capture, OutputFormat::Ts, false).await;
        assert_eq!(finals, vec![capture.clone()]);
        assert!(capture.exists());
    }

    #[tokio::test]
    async fn test_run_mp4_skips_remux() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("cap.mp4");
        std::fs::write(&capture, b"x").unwrap();

        let processor = PostProcessor::new("definitely-not-invoked", None);
        let finals = processor.run(&capture, OutputFormat::Mp4, false).await;
        assert_eq!(finals, vec![capture]);
    }
}
