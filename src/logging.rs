//! Tracing configuration and log routing.
//!
//! Logs go to stdout with a compact formatter and are mirrored into the file named by
//! [`Config::log_file`](crate::config::Config::log_file). The file layer uses a non-blocking
//! writer so that extraction workers never stall on log I/O.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// `RUST_LOG` controls filtering and defaults to `info`. When the log file cannot be opened,
/// only the stdout layer is installed.
pub fn init_tracing(log_file: &Path) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    match file_writer(log_file) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

fn file_writer(path: &Path) -> Option<NonBlocking> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name()?;

    if let Err(err) = std::fs::create_dir_all(directory) {
        eprintln!("Failed to create log directory {}: {err}", directory.display());
        return None;
    }

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
