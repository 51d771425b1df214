//! Log sinks
//!
//! `RUST_LOG` (default `mindnoscape=info`) filters everything. Below that:
//!
//! - stderr: compact, warnings and errors only so the prompt stays readable
//! - info log: INFO and above
//! - error log: ERROR only
//! - command log: the executor's per-command audit trail

use anyhow::Context;
use mindnoscape_core::session::COMMAND_LOG_TARGET;
use mindnoscape_core::Config;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "mindnoscape=info,mindnoscape_core=info,mindnoscape_cli=info";

pub(crate) struct LogFiles {
    pub info: File,
    pub error: File,
    pub commands: File,
}

fn append(path: &Path) -> anyhow::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

pub(crate) fn log_files_open(config: &Config) -> anyhow::Result<LogFiles> {
    std::fs::create_dir_all(&config.log_folder).with_context(|| {
        format!(
            "Failed to create log folder {}",
            config.log_folder.display()
        )
    })?;
    Ok(LogFiles {
        info: append(&config.info_log_path())?,
        error: append(&config.error_log_path())?,
        commands: append(&config.command_log_path())?,
    })
}

pub(crate) fn init(config: &Config) -> anyhow::Result<()> {
    let files = log_files_open(config)?;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::WARN);
    let info = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(files.info))
        .with_filter(LevelFilter::INFO);
    let error = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(files.error))
        .with_filter(LevelFilter::ERROR);
    let commands = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(files.commands))
        .with_filter(filter_fn(|metadata| {
            metadata.target() == COMMAND_LOG_TARGET
        }));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr)
        .with(info)
        .with(error)
        .with(commands)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}
