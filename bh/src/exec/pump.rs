//! Output and input pumps for a pty session
//!
//! Both pumps run on plain OS threads because every read they make can block
//! for an unbounded time. The output pump owns a cloned reader of the pty
//! master and feeds decoded text into a bounded channel. The input pump copies
//! the caller's input into the pty through a [`SharedWriter`] that the session
//! revokes when it closes. A pump stuck writing into a terminal nobody reads
//! keeps its writer until that write returns; the session never waits for it.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Item delivered by the output pump
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutputEvent {
    /// Decoded terminal output
    Chunk(String),
    /// Reading the terminal failed; streaming has stopped
    ReadError(String),
}

/// Incremental UTF-8 decoder that carries split sequences between reads
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode `bytes`, holding back a trailing incomplete sequence
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is still held back at end of stream
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(tail)
    }
}

/// Terminal-close shows up as EIO on Linux once the slave side is gone
fn is_end_of_stream(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(nix::errno::Errno::EIO as i32) {
            return true;
        }
    }
    err.kind() == io::ErrorKind::UnexpectedEof
}

/// Spawn the thread that reads the pty master until end of stream
///
/// The channel closes when the thread exits. The reader is dropped before the
/// sender so a closed channel always means the descriptor is released.
pub(crate) fn spawn_output_pump(
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<OutputEvent>,
    buffer_size: usize,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("bh-output".to_string()).spawn(move || {
        debug!("output pump: started");
        let mut buf = vec![0u8; buffer_size.max(1)];
        let mut decoder = Utf8Decoder::default();

        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("output pump: end of stream");
                    break;
                }
                Ok(n) => {
                    let text = decoder.decode(&buf[..n]);
                    if !text.is_empty() && tx.blocking_send(OutputEvent::Chunk(text)).is_err() {
                        debug!("output pump: receiver gone, exiting");
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_end_of_stream(&e) => {
                    debug!(%e, "output pump: terminal closed");
                    break;
                }
                Err(e) => {
                    warn!(%e, "output pump: read failed");
                    let _ = tx.blocking_send(OutputEvent::ReadError(e.to_string()));
                    break;
                }
            }
        }

        if let Some(tail) = decoder.finish() {
            let _ = tx.blocking_send(OutputEvent::Chunk(tail));
        }
        drop(reader);
        drop(tx);
        debug!("output pump: exiting");
    })
}

/// Pty writer that the session can revoke while the input pump still runs
///
/// The writer is taken out of its slot for the duration of each write, so no
/// lock is held while a write blocks on a full terminal input queue. Revoking
/// sets a flag and takes the writer only if the slot is free; otherwise the
/// thread that is mid-write drops it once the write returns.
#[derive(Clone)]
pub(crate) struct SharedWriter {
    slot: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
    revoked: Arc<AtomicBool>,
}

impl SharedWriter {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(writer))),
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Write all of `bytes`; `Ok(false)` once the writer has been revoked
    pub fn write_all(&self, bytes: &[u8]) -> io::Result<bool> {
        if self.is_revoked() {
            return Ok(false);
        }
        let Some(mut writer) = self.lock_slot().take() else {
            return Ok(false);
        };

        let written = writer.write_all(bytes).and_then(|_| writer.flush());

        *self.lock_slot() = Some(writer);
        // A revoke that raced with the put-back above could not take the writer
        if self.is_revoked() {
            let late = self.lock_slot().take();
            drop(late);
        }
        written.map(|_| true)
    }

    /// Mark the writer revoked and hand back the writer if no write holds it
    ///
    /// Never blocks. Returns `None` when a write is in flight; that writer is
    /// dropped by the writing thread.
    pub fn revoke(&self) -> Option<Box<dyn Write + Send>> {
        self.revoked.store(true, Ordering::SeqCst);
        match self.slot.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().take(),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Box<dyn Write + Send>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawn the thread that forwards caller input into the pty
///
/// This thread is never joined. A read on the caller's input cannot be
/// interrupted, so after the session revokes the writer the thread lingers
/// until that read returns and then exits without writing.
pub(crate) fn spawn_input_pump<R>(mut input: R, writer: SharedWriter, buffer_size: usize) -> io::Result<()>
where
    R: Read + Send + 'static,
{
    std::thread::Builder::new().name("bh-input".to_string()).spawn(move || {
        debug!("input pump: started");
        let mut buf = vec![0u8; buffer_size.max(1)];
        loop {
            let n = match input.read(&mut buf) {
                Ok(0) => {
                    debug!("input pump: input exhausted");
                    break;
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(%e, "input pump: read failed");
                    break;
                }
            };
            match writer.write_all(&buf[..n]) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("input pump: writer revoked, dropping input");
                    break;
                }
                Err(e) => {
                    debug!(%e, "input pump: write failed");
                    break;
                }
            }
        }
        debug!("input pump: exiting");
    })?;
    Ok(())
}
