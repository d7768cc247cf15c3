//! bashhub CLI entry point

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use bashhub::cli::{Cli, Command, OutputFormat};
use bashhub::config::Config;
use bashhub::terminal::{RawModeGuard, pty_size};
use bashhub::{Executor, Substitutions, extract, prompt, substitute};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logs go to a file so they never interleave with script output on the terminal
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bashhub")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("bh.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn read_script(path: &Path) -> Result<String> {
    fs::read_to_string(path).context(format!("Failed to read script {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run { script, set } => cmd_run(&config, &script, set).await,
        Command::Placeholders { script, format } => {
            cmd_placeholders(&script, format)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Render { script, set } => {
            let text = read_script(&script)?;
            let values: Substitutions = set.into_iter().collect();
            print!("{}", substitute(&text, &values));
            io::stdout().flush()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_run(config: &Config, path: &Path, set: Vec<(String, String)>) -> Result<ExitCode> {
    debug!(path = %path.display(), preset = set.len(), "cmd_run: called");
    let text = read_script(path)?;

    let values = prompt::collect_values(&text, set.into_iter().collect(), io::stdin().lock(), io::stdout())
        .context("Failed to collect placeholder values")?;
    let script = substitute(&text, &values);

    let mut options = config.to_exec_options();
    (options.rows, options.cols) = pty_size(config);
    let executor = Executor::new(options);

    info!(path = %path.display(), "Running script");
    let raw_mode = RawModeGuard::enter(config.terminal.raw_mode)?;
    let mut stdout = io::stdout();
    let result = executor
        .execute(&script, io::stdin(), |chunk| {
            if let Err(e) = stdout.write_all(chunk.as_bytes()).and_then(|_| stdout.flush()) {
                debug!(%e, "cmd_run: failed to write output chunk");
            }
        })
        .await;
    drop(raw_mode);

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if e.process_started() => return Err(e).context("Script execution failed"),
        Err(e) => return Err(e).context(format!("Could not start {}", path.display())),
    };

    if let Some(e) = &outcome.read_error {
        warn!(%e, "Output stopped early");
        eprintln!("{} output stopped early: {}", "warning:".yellow(), e);
    }
    if !outcome.success {
        eprintln!("{} script exited with code {}", "✗".red(), outcome.exit_code);
    }

    Ok(ExitCode::from(u8::try_from(outcome.exit_code).unwrap_or(1)))
}

fn cmd_placeholders(path: &Path, format: OutputFormat) -> Result<()> {
    let names = extract(&read_script(path)?);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&names)?),
        OutputFormat::Text if names.is_empty() => println!("No placeholders found"),
        OutputFormat::Text => {
            for name in names {
                println!("{}", name.cyan());
            }
        }
    }
    Ok(())
}
