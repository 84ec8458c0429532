//! Logging initialization.
//!
//! Human-readable events go to stdout. When a log directory is given, the
//! same events are also written there as JSON lines through a non-blocking
//! appender. `RUST_LOG` overrides the default `info` filter.

use crate::error::SimulationError;
use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// File name prefix of the JSON log inside the log directory.
pub const LOG_FILE_NAME: &str = "salessim.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// The returned guard must be kept alive until exit so buffered file output
/// is flushed; it is `None` when no log directory was given.
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, SimulationError> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_filter(env_filter());

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| SimulationError::Config(format!("Failed to initialize logging: {}", e)))?;

    if let Some(dir) = log_dir {
        tracing::info!(path = %dir.join(LOG_FILE_NAME).display(), "logging to file");
    }

    Ok(guard)
}
