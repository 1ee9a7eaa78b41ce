#![deny(clippy::all)]

mod agent;
mod command;
mod config;
mod error;
mod monitor;
mod naming;
mod postprocess;
mod resolver;
mod session;
mod shutdown;
mod signal_handler;
mod supervisor;

pub use agent::RecorderAgent;
pub use command::CommandBuilder;
pub use command::NetworkProfile;
pub use command::OutputFormat;
pub use command::default_headers_for;
pub use config::FolderPolicy;
pub use config::RecorderConfig;
pub use error::RecordError;
pub use monitor::Monitor;
pub use monitor::SessionLauncher;
pub use naming::sanitize_name;
pub use postprocess::PostProcessor;
pub use resolver::HelperResolver;
pub use resolver::Quality;
pub use resolver::Resolver;
pub use resolver::ResolverRegistry;
pub use resolver::StreamInfo;
pub use session::RecordingSession;
pub use session::SessionState;
pub use shutdown::ShutdownToken;
pub use signal_handler::SignalHandler;
pub use supervisor::CaptureProcess;
pub use supervisor::StopOutcome;

pub type Result<T> = std::result::Result<T, RecordError>;
