use std::path::PathBuf;
use thiserror::Error;

/// Failures the session commands report to the user.
///
/// A malformed log has no variant here: the decoder drops what it cannot
/// read instead of failing.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already active (pid {pid}, log {})", log_file.display())]
    Conflict { pid: u32, log_file: PathBuf },

    #[error("{0}")]
    NotFound(String),

    #[error("could not signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },

    #[error("summary service failed: {0}")]
    ExternalService(String),

    #[error(transparent)]
    Storage(#[from] std::io::Error),
}

impl SessionError {
    /// Errors that are reported as a single line instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SessionError::Storage(_))
    }
}
