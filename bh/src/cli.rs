//! CLI argument parsing for bashhub

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// bashhub - run placeholder-templated shell scripts under a pty
#[derive(Parser, Debug)]
#[command(name = "bh")]
#[command(author, version, about = "Fill script placeholders and run the script under a pty", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fill placeholders and run a script
    Run {
        /// Script file
        #[arg(required = true)]
        script: PathBuf,

        /// Placeholder value (NAME=VALUE); repeatable
        #[arg(short, long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },

    /// List the placeholders of a script in prompting order
    Placeholders {
        /// Script file
        #[arg(required = true)]
        script: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print a script with the given placeholder values filled in
    Render {
        /// Script file
        #[arg(required = true)]
        script: PathBuf,

        /// Placeholder value (NAME=VALUE); repeatable
        #[arg(short, long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, String)>,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Split `NAME=VALUE` at the first `=`; the value may itself contain `=`
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        Some(_) => Err(format!("missing placeholder name in '{}'", s)),
        None => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}
