//! Stream resolution: the capability interface and the platform registry.
//!
//! Turning a room URL into a playable media URL is delegated to an external
//! collaborator. The registry maps URL patterns to resolver implementations
//! so adding a platform means registering one entry, not editing a
//! conditional chain.

use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RecordError;

/// Requested capture quality, passed through to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// Original quality.
    #[default]
    Od,
    Hd,
    Sd,
    Ld,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Od => "od",
            Quality::Hd => "hd",
            Quality::Sd => "sd",
            Quality::Ld => "ld",
        }
    }
}

impl FromStr for Quality {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "od" => Ok(Quality::Od),
            "hd" => Ok(Quality::Hd),
            "sd" => Ok(Quality::Sd),
            "ld" => Ok(Quality::Ld),
            other => Err(RecordError::Resolve(format!("unknown quality: {other}"))),
        }
    }
}

/// Liveness and metadata for one stream, as reported by a resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub is_live: bool,
    /// The playable media URL to hand to the capture subprocess.
    #[serde(default)]
    pub record_url: String,
    #[serde(default)]
    pub anchor_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub platform: String,
}

/// Capability interface: resolve a room URL into liveness and a playable URL.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, url: &str, quality: Quality) -> crate::Result<StreamInfo>;
}

struct RegistryEntry {
    platform: &'static str,
    pattern: &'static str,
    resolver: Arc<dyn Resolver>,
}

/// Maps URL-substring patterns to resolver implementations, with a default
/// for URLs no pattern matches.
pub struct ResolverRegistry {
    entries: Vec<RegistryEntry>,
    default: (&'static str, Arc<dyn Resolver>),
}

impl ResolverRegistry {
    pub fn new(default_platform: &'static str, default: Arc<dyn Resolver>) -> Self {
        Self {
            entries: Vec::new(),
            default: (default_platform, default),
        }
    }

    pub fn register(
        mut self,
        platform: &'static str,
        pattern: &'static str,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        self.entries.push(RegistryEntry {
            platform,
            pattern,
            resolver,
        });
        self
    }

    /// Registry with the known platforms, all backed by one resolver.
    /// Unmatched URLs fall back to the douyin resolver.
    pub fn with_known_platforms(resolver: Arc<dyn Resolver>) -> Self {
        Self::new("douyin", Arc::clone(&resolver))
            .register("douyin", "douyin.com", Arc::clone(&resolver))
            .register("tiktok", "tiktok.com", Arc::clone(&resolver))
            .register("bilibili", "bilibili.com", resolver)
    }

    /// Pick the resolver for a URL; returns the platform name with it.
    pub fn resolver_for(&self, url: &str) -> (&'static str, Arc<dyn Resolver>) {
        for entry in &self.entries {
            if url.contains(entry.pattern) {
                return (entry.platform, Arc::clone(&entry.resolver));
            }
        }
        (self.default.0, Arc::clone(&self.default.1))
    }
}

/// Resolver that shells out to an external helper executable.
///
/// The helper receives `--url`, `--quality` and optional `--proxy`/
/// `--cookies` arguments and prints a [`StreamInfo`] JSON object on stdout.
pub struct HelperResolver {
    program: String,
    proxy: Option<String>,
    cookies_file: Option<PathBuf>,
}

impl HelperResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            proxy: None,
            cookies_file: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies_file(mut self, cookies_file: Option<PathBuf>) -> Self {
        self.cookies_file = cookies_file;
        self
    }
}

#[async_trait]
impl Resolver for HelperResolver {
    async fn resolve(&self, url: &str, quality: Quality) -> crate::Result<StreamInfo> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg("--url")
            .arg(url)
            .arg("--quality")
            .arg(quality.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(proxy) = &self.proxy {
            command.arg("--proxy").arg(proxy);
        }
        if let Some(cookies) = &self.cookies_file {
            command.arg("--cookies").arg(cookies);
        }

        debug!(program = %self.program, url, "invoking resolver helper");
        let output = command
            .output()
            .await
            .map_err(|e| RecordError::Resolve(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecordError::Resolve(format!(
                "{} exited with {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| RecordError::Resolve(format!("malformed resolver output: {e}")))
    }
}
