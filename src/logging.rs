use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Where and how verbosely to log
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory for log files (e.g. "logs")
    pub log_dir: Utf8PathBuf,
    /// Prefix for log files (e.g. "mdg")
    pub log_prefix: String,
    /// Use debug level instead of info when `RUST_LOG` is not set
    pub debug_mode: bool,
    /// Also log to the console with ANSI colors
    pub console_output: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_dir: Utf8PathBuf::from("logs"),
            log_prefix: "mdg".to_string(),
            debug_mode: false,
            console_output: true,
        }
    }
}

impl LogOptions {
    /// `RUST_LOG` wins; otherwise debug or info depending on `debug_mode`.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if self.debug_mode {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("info")
            }
        })
    }
}

/// Create the log directory if it is missing.
pub fn ensure_log_dir(options: &LogOptions) -> Result<()> {
    if !options.log_dir.exists() {
        fs::create_dir_all(&options.log_dir)
            .with_context(|| format!("Failed to create log directory: {}", options.log_dir))?;
    }
    Ok(())
}

/// Setup logging with a daily rotating file appender and optional console output.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(options: &LogOptions) -> Result<WorkerGuard> {
    ensure_log_dir(options)?;

    let file_appender = rolling::daily(&options.log_dir, &options.log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = options.console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(options.env_filter())
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        options.log_dir,
        options.log_prefix,
        options.debug_mode,
        options.console_output
    );

    Ok(guard)
}
