use anyhow::{Context, Result};
use memerelay_core::config::LoggingSettings;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

const MANUAL_LOG_DIR: &str = "logs";
const SYSTEM_LOG_DIR: &str = "/var/log/memerelay";

/// Where the log files go when the configuration does not say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLocation {
    pub under_systemd: bool,
    pub home: Option<PathBuf>,
    pub system_dir: PathBuf,
}

impl LogLocation {
    pub fn from_env() -> Self {
        Self {
            under_systemd: std::env::var_os("INVOCATION_ID").is_some(),
            home: std::env::var_os("HOME").map(PathBuf::from),
            system_dir: PathBuf::from(SYSTEM_LOG_DIR),
        }
    }

    /// `logs/` when run by hand. Under systemd the system log directory, or
    /// the user state directory when that is not writable.
    pub fn resolve(&self, configured: Option<&Path>) -> PathBuf {
        if let Some(dir) = configured {
            return dir.to_path_buf();
        }
        if !self.under_systemd {
            return PathBuf::from(MANUAL_LOG_DIR);
        }
        if is_writable_dir(&self.system_dir) {
            return self.system_dir.clone();
        }
        match &self.home {
            Some(home) => home.join(".local").join("state").join("memerelay"),
            None => PathBuf::from(MANUAL_LOG_DIR),
        }
    }
}

fn is_writable_dir(dir: &Path) -> bool {
    fs::create_dir_all(dir).is_ok() && tempfile::tempfile_in(dir).is_ok()
}

/// `RUST_LOG` wins; otherwise info, or debug for our own crates.
fn env_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new(
                "info,memerelay=debug,memerelay_core=debug,reddit_client=debug,\
                 telegram_sender=debug,seen_store=debug,background_service=debug,monitoring=debug",
            )
        } else {
            EnvFilter::new("info")
        }
    })
}

/// Console-only subscriber used while the configuration is being read.
pub fn console_subscriber(debug_mode: bool) -> impl tracing::Subscriber + Send + Sync {
    Registry::default()
        .with(env_filter(debug_mode))
        .with(tracing_subscriber::fmt::layer().with_target(false))
}

/// Install the global subscriber: console plus a daily rotated file.
///
/// The returned guard must be held for the life of the process or buffered
/// lines are lost.
pub fn setup_logging(settings: &LoggingSettings, debug_mode: bool) -> Result<WorkerGuard> {
    let log_dir = LogLocation::from_env().resolve(settings.directory.as_deref());
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = rolling::daily(&log_dir, &settings.file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);
    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter(debug_mode))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}",
        log_dir.display(),
        settings.file_prefix,
        debug_mode
    );

    Ok(guard)
}
