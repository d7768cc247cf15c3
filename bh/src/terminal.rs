//! The caller's own terminal while a script runs

use crossterm::terminal;
use crossterm::tty::IsTty;
use eyre::{Context, Result};
use tracing::{debug, warn};

use crate::config::Config;

/// Raw mode for the lifetime of the guard
///
/// In raw mode keystrokes (including Ctrl-C) go straight to the script's pty,
/// whose own line discipline handles echo and signals.
pub struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    /// Enable raw mode when stdin is a terminal and `wanted` is set
    pub fn enter(wanted: bool) -> Result<Self> {
        let enabled = wanted && std::io::stdin().is_tty();
        debug!(wanted, enabled, "RawModeGuard::enter: called");
        if enabled {
            terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        }
        Ok(Self { enabled })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled
            && let Err(e) = terminal::disable_raw_mode()
        {
            warn!(%e, "Failed to restore terminal mode");
        }
    }
}

/// Pty size for a run: the real terminal size when there is one, else config
pub fn pty_size(config: &Config) -> (u16, u16) {
    if std::io::stdout().is_tty()
        && let Ok((cols, rows)) = terminal::size()
        && rows > 0
        && cols > 0
    {
        debug!(rows, cols, "pty_size: using terminal size");
        return (rows, cols);
    }
    (config.pty.rows, config.pty.cols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_without_raw_mode_is_inert() {
        let guard = RawModeGuard::enter(false).unwrap();
        assert!(!guard.enabled);
    }
}
