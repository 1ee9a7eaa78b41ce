//! Capture subprocess supervision.
//!
//! Owns one external media-processing subprocess: spawn, wait, and the
//! graceful-then-forceful stop sequence. The supervisor touches no files;
//! everything on disk belongs to the session that owns the save path.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::RecordError;

/// Keep only the tail of stderr; a long capture can log for hours.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// How a stop sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Process was already gone when stop was requested.
    AlreadyExited,
    /// Exited after the quit byte on stdin.
    Graceful,
    /// Exited after SIGTERM.
    Terminated,
    /// Had to be SIGKILLed.
    Killed,
}

/// One running capture subprocess.
#[derive(Debug)]
pub struct CaptureProcess {
    child: Child,
    // Held outside `child` so polling `wait()` cannot close the pipe; the
    // quit byte must stay deliverable for the whole capture.
    stdin: Option<ChildStdin>,
    program: String,
    stderr_task: Option<JoinHandle<String>>,
    exit: Option<std::process::ExitStatus>,
}

impl CaptureProcess {
    /// Spawn the subprocess described by `argv` (program name first).
    ///
    /// Stdin stays open for the graceful quit byte; stderr is captured for
    /// diagnostics; stdout is discarded.
    pub fn spawn(argv: &[String]) -> crate::Result<Self> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            RecordError::Spawn {
                program: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
            }
        })?;

        debug!(program, args = ?args, "spawning capture subprocess");
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecordError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        let stdin = child.stdin.take();
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(collect_stderr_tail(stderr))
        });

        info!(program, pid = child.id(), "capture subprocess started");
        Ok(Self {
            child,
            stdin,
            program: program.clone(),
            stderr_task,
            exit: None,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the subprocess to exit and classify the result.
    ///
    /// Exit code 0 and the recorder's interrupted-exit code are success, as
    /// is termination by the signal the stop sequence sends; anything else
    /// is an abnormal exit carrying the captured stderr tail.
    pub async fn wait(&mut self) -> crate::Result<()> {
        let status = self.wait_status().await?;
        let stderr = self.stderr_tail().await;
        classify_exit(status.code(), exit_signal(&status), &stderr)
    }

    /// Graceful-then-forceful stop. Never returns while the process lives.
    ///
    /// Quit byte on stdin, wait `graceful`; SIGTERM, wait `terminate`;
    /// SIGKILL, wait unconditionally. Idempotent on an exited process.
    pub async fn stop(&mut self, graceful: Duration, terminate: Duration) -> StopOutcome {
        if self.exited() {
            debug!(program = %self.program, "stop requested but process already exited");
            return StopOutcome::AlreadyExited;
        }

        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.flush().await;
            // Dropping stdin closes the pipe; recorders that stop on EOF
            // also get their signal this way.
        }
        if self.wait_up_to(graceful).await {
            info!(program = %self.program, "capture stopped gracefully");
            return StopOutcome::Graceful;
        }

        warn!(program = %self.program, "quit byte ignored, sending SIGTERM");
        self.send_terminate();
        if self.wait_up_to(terminate).await {
            info!(program = %self.program, "capture stopped after SIGTERM");
            return StopOutcome::Terminated;
        }

        warn!(program = %self.program, "SIGTERM ignored, killing");
        let _ = self.child.start_kill();
        let _ = self.wait_status().await;
        StopOutcome::Killed
    }

    /// Collected stderr tail; empty until the process has exited.
    pub async fn stderr_tail(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }

    fn exited(&mut self) -> bool {
        if self.exit.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                true
            }
            _ => false,
        }
    }

    async fn wait_status(&mut self) -> std::io::Result<std::process::ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        Ok(status)
    }

    async fn wait_up_to(&mut self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait_status())
            .await
            .is_ok()
    }

    #[cfg(unix)]
    fn send_terminate(&self) {
        if let Some(pid) = self.child.id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&self) {
        // No SIGTERM equivalent; the kill step follows immediately.
    }
}

async fn collect_stderr_tail(mut stderr: ChildStderr) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    let cut = tail.len() - STDERR_TAIL_BYTES;
                    tail.drain(..cut);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Pure exit classification, split out so the code paths for codes we never
/// produce in tests (like 137) stay testable.
fn classify_exit(code: Option<i32>, signal: Option<i32>, stderr: &str) -> crate::Result<()> {
    // 255 is ffmpeg's exit code when interrupted mid-stream.
    if matches!(code, Some(0) | Some(255)) {
        return Ok(());
    }
    #[cfg(unix)]
    if signal == Some(libc::SIGTERM) {
        return Ok(());
    }
    #[cfg(not(unix))]
    let _ = signal;
    Err(RecordError::AbnormalExit {
        code,
        stderr: stderr.to_string(),
    })
}
