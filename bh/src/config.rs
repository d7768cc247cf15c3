//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::exec::ExecOptions;

/// Main bashhub configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Pseudo-terminal geometry
    pub pty: PtyConfig,

    /// Execution engine tunables
    pub exec: ExecConfig,

    /// Handling of the caller's own terminal
    pub terminal: TerminalConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed here; [`Config::load`] reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::default_paths(),
        };
        paths
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|config| config.log_level)
    }

    /// Convert to options for the execution engine
    pub fn to_exec_options(&self) -> ExecOptions {
        ExecOptions {
            rows: self.pty.rows,
            cols: self.pty.cols,
            read_buffer_size: self.exec.read_buffer_size,
            channel_capacity: self.exec.channel_capacity,
            drain_timeout: Duration::from_millis(self.exec.drain_timeout_ms),
            ..ExecOptions::default()
        }
    }

    /// Project-local `.bashhub.yml`, then `~/.config/bashhub/bashhub.yml`
    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".bashhub.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("bashhub").join("bashhub.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Pseudo-terminal geometry used when the real terminal size is unknown
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    pub rows: u16,
    pub cols: u16,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// Execution engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Bytes per read on the pty
    #[serde(rename = "read-buffer-size")]
    pub read_buffer_size: usize,

    /// Output chunks buffered before the reader blocks
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,

    /// How long output may keep draining after the script exits
    #[serde(rename = "drain-timeout-ms")]
    pub drain_timeout_ms: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            channel_capacity: 256,
            drain_timeout_ms: 500,
        }
    }
}

/// Handling of the caller's terminal while a script runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Put the caller's terminal in raw mode so keystrokes reach the script unbuffered
    #[serde(rename = "raw-mode")]
    pub raw_mode: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { raw_mode: true }
    }
}
