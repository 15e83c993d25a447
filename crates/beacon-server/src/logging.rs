//! Logging initialization and configuration.
//!
//! [`LogMode`] picks the output:
//! - **Production**: JSON logs to rolling files + compact logs to stdout
//! - **Development**: Pretty logs to stdout with span events
//!
//! The filter comes from `RUST_LOG`, then `BEACON_LOG_LEVEL`, then `info`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fallback filter when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "BEACON_LOG_LEVEL";

/// Selects production logging when set to `production`.
pub const ENVIRONMENT_ENV: &str = "BEACON_ENV";

/// Overrides the production log directory.
pub const LOG_DIR_ENV: &str = "BEACON_LOG_DIR";

/// File name prefix for the rolling log files.
const LOG_FILE_PREFIX: &str = "beacon-relay";

/// Guards for the non-blocking writers. Dropping one stops its writer.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where and how log output is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    /// Rolling JSON files plus compact stdout for journald.
    Production,
    /// Pretty stdout only.
    #[default]
    Development,
}

impl LogMode {
    /// Read the mode from `BEACON_ENV`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(std::env::var(ENVIRONMENT_ENV).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }
}

/// Initialize the logging system for `mode`.
///
/// # Production Mode
///
/// - Logs to rolling daily files in `/var/log/beacon-relay/`, or `BEACON_LOG_DIR`
/// - Also logs to stdout for systemd journal capture
/// - JSON format for structured logging in files
///
/// # Development Mode
///
/// - Logs to stdout only with pretty formatting
/// - Includes span events for debugging
///
/// # Errors
///
/// Returns an error if the env filter cannot be parsed or the log directory
/// cannot be created.
pub fn init(mode: LogMode) -> anyhow::Result<()> {
    let env_filter = build_filter(std::env::var(LOG_LEVEL_ENV).ok().as_deref())?;

    match mode {
        LogMode::Production => {
            let dir = log_directory(std::env::var_os(LOG_DIR_ENV).map(PathBuf::from));
            init_production(env_filter, &dir)
        }
        LogMode::Development => {
            init_development(env_filter);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise `fallback`, otherwise `info`.
fn build_filter(fallback: Option<&str>) -> anyhow::Result<EnvFilter> {
    let level = fallback.unwrap_or("info");
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log filter '{level}'"))
}

fn init_production(env_filter: EnvFilter, log_dir: &Path) -> anyhow::Result<()> {
    let (file_writer, file_guard) = rolling_file_writer(log_dir)?;
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    // File layer - one JSON object per event
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // Stdout layer - compact, journald adds its own timestamps
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    tracing::info!(dir = %log_dir.display(), "File logging enabled");
    Ok(())
}

/// Daily-rolling non-blocking writer in `log_dir`, created if missing.
fn rolling_file_writer(log_dir: &Path) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;
    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

fn init_development(env_filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

/// `override_dir` if given, else the platform log directory.
fn log_directory(override_dir: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir;
    }

    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log").join(LOG_FILE_PREFIX)
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", LOG_FILE_PREFIX)
            .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
    }
}
