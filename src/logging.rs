//! Tracing setup: stderr output filtered by `GAMETHUMB_LOG` or `-v`, plus an optional log file.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::Error;

/// Environment variable holding an `EnvFilter` directive. Wins over `-v`.
const FILTER_ENV: &str = "GAMETHUMB_LOG";

/// Map the `-v` count to a default filter directive.
const fn level_for_verbosity(verbosity: u8) -> &'static str {
    return match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
}

/// Install the global subscriber. The returned guard must be held until exit
/// so the file writer flushes.
///
/// # Errors
///
/// Returns `Error::LogFile` if `log_file` (or its directory) cannot be created.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>, Error> {
    let filter = EnvFilter::try_from_env(FILTER_ENV)
        .unwrap_or_else(|_| return EnvFilter::new(level_for_verbosity(verbosity)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = match log_file {
        None => (None, None),
        Some(path) => {
            let (writer, guard) = open_log_file(path)?;
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        },
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    return Ok(guard);
}

/// Open `path` for appending behind a background writer, creating its directory.
///
/// # Errors
///
/// Returns `Error::LogFile` if the directory or file cannot be created.
fn open_log_file(path: &Path) -> Result<(NonBlocking, WorkerGuard), Error> {
    let dir = path.parent().filter(|p| return !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = path.file_name().map(|n| return n.to_string_lossy().into_owned()).ok_or_else(|| {
        return Error::LogFile { path: path.to_path_buf(), reason: "not a file path".to_string() };
    })?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(|e| return Error::LogFile { path: path.to_path_buf(), reason: e.to_string() })?;
    return Ok(tracing_appender::non_blocking(appender));
}
