//! Pty session lifecycle
//!
//! A session is one child process attached to a freshly allocated pty plus
//! the three activities that serve it: the output pump, the input pump and a
//! thread blocked in `wait`. [`Session::finish`] multiplexes the output
//! channel with the exit notification and returns once the exit status is
//! known. The pty handles are released right after that, and remaining
//! output drains for at most [`ExecOptions::drain_timeout`].
//!
//! Closing the pty writer sends a newline and an end-of-input character to
//! the terminal. While something still holds the terminal open (a background
//! job started by the script), the echo of that newline can show up in the
//! drained output.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use portable_pty::{ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtyPair, PtySize, native_pty_system};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::error::ExecError;
use super::pump::{OutputEvent, SharedWriter, spawn_input_pump, spawn_output_pump};
use super::{ExecOptions, ExitOutcome};

/// Owns the pty master and writer; releases both exactly once
struct PtyGuard {
    master: Option<Box<dyn MasterPty + Send>>,
    writer: SharedWriter,
}

impl PtyGuard {
    fn release(&mut self) {
        let writer = self.writer.revoke();
        let writer_open = writer.is_some();
        if let Some(writer) = writer {
            close_writer(writer);
        }
        let master_open = self.master.take().is_some();
        if writer_open || master_open {
            debug!(writer_open, master_open, "PtyGuard::release: pty handles closed");
        }
    }
}

impl Drop for PtyGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Drop a pty writer off the calling thread
///
/// Dropping the writer writes an end-of-input sequence into the terminal,
/// which blocks while the terminal's input queue is full.
fn close_writer(writer: Box<dyn Write + Send>) {
    let spawned = std::thread::Builder::new()
        .name("bh-close".to_string())
        .spawn(move || drop(writer));
    if let Err(e) = spawned {
        warn!(%e, "close_writer: failed to spawn thread, writer closed inline");
    }
}

/// Killer for the child plus whether the wait thread has reaped it
struct ChildHandle {
    killer: Box<dyn ChildKiller + Send + Sync>,
    reaped: bool,
}

/// Handle for ending a running session early
///
/// Terminating behaves like a natural exit: the wait completes, the pty is
/// released and [`Session::finish`] returns the resulting status.
#[derive(Clone)]
pub struct Terminator {
    pid: Option<u32>,
    child: Arc<Mutex<ChildHandle>>,
}

impl Terminator {
    /// Ask the child to terminate (SIGTERM on Unix)
    ///
    /// Does nothing once the child has been reaped, so a handle that outlives
    /// its session never signals a recycled pid.
    pub fn terminate(&self) -> io::Result<()> {
        debug!(pid = ?self.pid, "Terminator::terminate: called");
        let mut child = self
            .child
            .lock()
            .map_err(|_| io::Error::other("child handle lock poisoned"))?;
        if child.reaped {
            debug!(pid = ?self.pid, "Terminator::terminate: already reaped, nothing to do");
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid {
                return kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from);
            }
        }

        child.killer.kill()
    }

    fn mark_reaped(&self) {
        self.child.lock().unwrap_or_else(PoisonError::into_inner).reaped = true;
    }
}

/// A running script attached to a pty
pub struct Session {
    pid: Option<u32>,
    terminator: Terminator,
    output: mpsc::Receiver<OutputEvent>,
    exit: oneshot::Receiver<io::Result<ExitStatus>>,
    pty: PtyGuard,
    drain_timeout: Duration,
    started: Instant,
}

impl Session {
    /// Allocate a pty, start `shell -c script` on it and start the pumps
    pub(crate) fn start<R>(script: &str, input: R, options: &ExecOptions) -> Result<Self, ExecError>
    where
        R: Read + Send + 'static,
    {
        debug!(shell = %options.shell, rows = options.rows, cols = options.cols, "Session::start: called");
        let started = Instant::now();

        let PtyPair { master, slave } = native_pty_system()
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ExecError::PtyAllocationFailed(format!("{:#}", e)))?;

        let reader = master
            .try_clone_reader()
            .map_err(|e| ExecError::PtyAllocationFailed(format!("{:#}", e)))?;
        let writer = master
            .take_writer()
            .map_err(|e| ExecError::PtyAllocationFailed(format!("{:#}", e)))?;
        let pty = PtyGuard {
            master: Some(master),
            writer: SharedWriter::new(writer),
        };

        let mut cmd = CommandBuilder::new(&options.shell);
        cmd.arg("-c");
        cmd.arg(script);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let start_failed = |message: String| ExecError::ProcessStartFailed {
            shell: options.shell.clone(),
            message,
        };

        let mut child = slave.spawn_command(cmd).map_err(|e| start_failed(format!("{:#}", e)))?;
        // The child holds its own slave descriptors; ours must go so the
        // reader sees end of stream when the child exits.
        drop(slave);

        let pid = child.process_id();
        let terminator = Terminator {
            pid,
            child: Arc::new(Mutex::new(ChildHandle {
                killer: child.clone_killer(),
                reaped: false,
            })),
        };
        info!(?pid, "Session::start: process started");

        let abort = |e: io::Error| {
            warn!(%e, "Session::start: failed to start session threads, killing child");
            let mut handle = terminator.child.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = handle.killer.kill();
            start_failed(format!("failed to spawn session thread: {}", e))
        };

        let (output_tx, output_rx) = mpsc::channel(options.channel_capacity.max(1));
        spawn_output_pump(reader, output_tx, options.read_buffer_size).map_err(abort)?;

        let (exit_tx, exit_rx) = oneshot::channel();
        let reaper = terminator.clone();
        std::thread::Builder::new()
            .name("bh-wait".to_string())
            .spawn(move || {
                let status = child.wait();
                reaper.mark_reaped();
                debug!(?status, "wait thread: child exited");
                let _ = exit_tx.send(status);
            })
            .map_err(abort)?;

        spawn_input_pump(input, pty.writer.clone(), options.read_buffer_size).map_err(abort)?;

        Ok(Self {
            pid,
            terminator,
            output: output_rx,
            exit: exit_rx,
            pty,
            drain_timeout: options.drain_timeout,
            started,
        })
    }

    /// Process id of the shell, when the platform reports one
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Handle that can end this session from another task
    pub fn terminator(&self) -> Terminator {
        self.terminator.clone()
    }

    /// Stream output to `on_output` until the process exits
    ///
    /// A terminal read error is passed to `on_output` as a diagnostic line,
    /// recorded on the outcome, and does not fail the run.
    pub async fn finish<F>(self, mut on_output: F) -> Result<ExitOutcome, ExecError>
    where
        F: FnMut(&str),
    {
        let Session {
            pid,
            mut output,
            mut exit,
            mut pty,
            drain_timeout,
            started,
            ..
        } = self;
        debug!(?pid, "Session::finish: called");
        let mut read_error = None;

        let waited = loop {
            tokio::select! {
                biased;
                Some(event) = output.recv() => deliver(event, &mut on_output, &mut read_error),
                waited = &mut exit => break waited,
            }
        };

        pty.release();

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(ExecError::ProcessWaitFailed(e.to_string())),
            Err(_) => {
                return Err(ExecError::ProcessWaitFailed(
                    "wait thread ended without reporting a status".to_string(),
                ));
            }
        };

        let drained = tokio::time::timeout(drain_timeout, async {
            while let Some(event) = output.recv().await {
                deliver(event, &mut on_output, &mut read_error);
            }
        })
        .await;
        if drained.is_err() {
            warn!(?pid, ?drain_timeout, "Session::finish: terminal still open after exit, abandoning output");
        }

        let outcome = ExitOutcome {
            exit_code: status.exit_code(),
            success: status.success(),
            read_error,
            duration: started.elapsed(),
        };
        info!(?pid, exit_code = outcome.exit_code, duration = ?outcome.duration, "Session::finish: process exited");
        Ok(outcome)
    }
}

fn deliver<F>(event: OutputEvent, on_output: &mut F, read_error: &mut Option<String>)
where
    F: FnMut(&str),
{
    match event {
        OutputEvent::Chunk(text) => on_output(&text),
        OutputEvent::ReadError(e) => {
            on_output(&format!("\r\nbh: terminal read error: {}\r\n", e));
            *read_error = Some(e);
        }
    }
}
