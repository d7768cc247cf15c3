//! Execution engine - run a script under a pseudo-terminal
//!
//! The script text is handed to `bash -c` as a single argument. The child gets
//! a pty as its controlling terminal, so prompts, colors and cursor movement
//! behave as they would in a real terminal. Output is decoded and streamed to
//! the caller, the caller's input is forwarded to the child, and the run
//! completes once the child exits.
//!
//! Only one session is expected to run at a time per caller; concurrent
//! sessions each get their own pty but must not share the caller's stdin.

use std::io::{self, Read};
use std::time::Duration;

use tracing::debug;

mod error;
mod pump;
mod session;

pub use error::ExecError;
pub use session::{Session, Terminator};

/// Shell that interprets every script
pub const DEFAULT_SHELL: &str = "bash";

/// Tunables for a run
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Interpreter invoked as `<shell> -c <script>`
    pub shell: String,
    /// Terminal height
    pub rows: u16,
    /// Terminal width
    pub cols: u16,
    /// Bytes per read on the pty and on the input source
    pub read_buffer_size: usize,
    /// Output chunks buffered before the pty reader blocks
    pub channel_capacity: usize,
    /// How long output may keep draining after the process exits
    pub drain_timeout: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            rows: 24,
            cols: 80,
            read_buffer_size: 4096,
            channel_capacity: 256,
            drain_timeout: Duration::from_millis(500),
        }
    }
}

/// Terminal result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code reported for the shell
    pub exit_code: u32,
    /// Whether the shell exited with status 0
    pub success: bool,
    /// Read error that stopped output streaming early, if any
    pub read_error: Option<String>,
    /// Wall time from spawn to exit
    pub duration: Duration,
}

/// Starts pty sessions with a fixed set of options
#[derive(Debug, Clone, Default)]
pub struct Executor {
    options: ExecOptions,
}

impl Executor {
    pub fn new(options: ExecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecOptions {
        &self.options
    }

    /// Start `script` and return the live session
    pub fn spawn<R>(&self, script: &str, input: R) -> Result<Session, ExecError>
    where
        R: Read + Send + 'static,
    {
        debug!(script_len = script.len(), "Executor::spawn: called");
        Session::start(script, input, &self.options)
    }

    /// Run `script` to completion, forwarding `input` and streaming output
    pub async fn execute<R, F>(&self, script: &str, input: R, on_output: F) -> Result<ExitOutcome, ExecError>
    where
        R: Read + Send + 'static,
        F: FnMut(&str),
    {
        self.spawn(script, input)?.finish(on_output).await
    }
}

/// Run `script` with default options, forwarding this process's stdin
pub async fn execute<F>(script: &str, on_output: F) -> Result<ExitOutcome, ExecError>
where
    F: FnMut(&str),
{
    Executor::default().execute(script, io::stdin(), on_output).await
}
