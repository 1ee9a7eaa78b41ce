//! Errors for the recording orchestrator.
//!
//! `NotLive` is an expected outcome of a liveness check, not a crash: the
//! monitor loop treats it (and resolver failures) as "try again next tick",
//! while a single-shot recording surfaces it to the caller.

use thiserror::Error;

/// Errors produced while resolving, capturing, or post-processing a stream.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to resolve stream: {0}")]
    Resolve(String),
    #[error("Stream is not live")]
    NotLive,
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Recorder exited abnormally (code {code:?})")]
    AbnormalExit { code: Option<i32>, stderr: String },
    #[error("Post-processing failed: {0}")]
    PostProcess(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RecordError {
    /// Expected outcomes of a liveness probe: logged at debug by the monitor
    /// loop instead of warn.
    pub fn is_expected(&self) -> bool {
        matches!(self, RecordError::NotLive)
    }

    /// Errors the monitor loop retries on its next interval.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RecordError::NotLive | RecordError::Resolve(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_live_is_expected_and_retryable() {
        assert!(RecordError::NotLive.is_expected());
        assert!(RecordError::NotLive.is_retryable());
    }

    #[test]
    fn test_resolve_error_is_retryable_not_expected() {
        let err = RecordError::Resolve("connection refused".into());
        assert!(!err.is_expected());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unsupported_format_is_fatal() {
        let err = RecordError::UnsupportedFormat("mkv".into());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Unsupported output format: mkv");
    }

    #[test]
    fn test_abnormal_exit_display_includes_code() {
        let err = RecordError::AbnormalExit {
            code: Some(137),
            stderr: String::new(),
        };
        assert!(err.to_string().contains("137"));
    }
}
