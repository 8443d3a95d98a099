use std::process::ExitStatus;
use std::time::Duration;

/// Errors raised while reading logs
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The log command could not be started
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the command's output or waiting on it failed
    #[error("I/O error while reading logs: {0}")]
    Io(#[from] std::io::Error),

    /// The command ran but exited unsuccessfully
    #[error("log command failed ({status})")]
    Exit { status: ExitStatus },

    /// The command did not finish within the allowed time
    #[error("log command timed out after {0:?}")]
    Timeout(Duration),

    /// Anything not covered above
    #[error("{0}")]
    Internal(String),
}

impl FetchError {
    /// Whether this failure is an expected way for the journal to be
    /// unavailable, to be answered with fallback data.
    pub fn falls_back(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}
