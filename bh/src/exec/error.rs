//! Execution error types

use thiserror::Error;

/// Errors that end a run before an exit status could be reported
///
/// Read errors on the terminal are not part of this enum: they are surfaced
/// through the output stream and recorded on [`super::ExitOutcome`] instead.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to allocate pseudo-terminal: {0}")]
    PtyAllocationFailed(String),

    #[error("Failed to start {shell}: {message}")]
    ProcessStartFailed { shell: String, message: String },

    #[error("Failed to wait for process: {0}")]
    ProcessWaitFailed(String),
}

impl ExecError {
    /// Check if the child process was ever started
    pub fn process_started(&self) -> bool {
        matches!(self, ExecError::ProcessWaitFailed(_))
    }
}
