use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Email build error: {0}")]
    Mail(#[from] lettre::error::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email attachment error: {0}")]
    Attachment(String),

    #[error("Mail transport failed: {0}")]
    Transport(String),

    #[error("Command execution failed: {0}")]
    Command(String),

    #[error("Executable not found: {}", .0.display())]
    MissingExecutable(PathBuf),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Conditions that end the process instead of being returned to the caller.
///
/// These are routed through an abort hook (see [`AbortHook`]) so that the
/// binary terminates while tests can observe the condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fatal {
    EmptyOutputDirectory,
    MissingAttachment(PathBuf),
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fatal::EmptyOutputDirectory => write!(f, "No path for backup files given!"),
            Fatal::MissingAttachment(path) => {
                write!(f, "Path of backup file not found: {}", path.display())
            }
        }
    }
}

pub type AbortHook = fn(&Fatal) -> !;

/// Default abort hook: report and exit with status 1.
pub fn exit_process(fatal: &Fatal) -> ! {
    tracing::error!(%fatal, "Aborting backup run");
    eprintln!("❌ {}", fatal);
    std::process::exit(1)
}
