//! Tracing subscriber setup: text or JSON lines, to stdout or to a daily
//! rolling file.

use std::path::Path;

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::cli::{LogFormat, LogLevel};

/// `--log-folder` value that selects stdout.
pub const STDOUT: &str = "stdout";

const FILE_PREFIX: &str = "aws-quota-exporter";

/// Keeps the background file writer alive. Hold it until exit.
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. When the log folder cannot be
/// used, logs go to stdout and a warning is emitted once logging is up.
pub fn init(format: LogFormat, level: LogLevel, folder: &str) -> LogGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let (writer, guard, fallback) = if folder == STDOUT {
        (BoxMakeWriter::new(std::io::stdout), None, None)
    } else {
        match file_writer(Path::new(folder)) {
            Ok((writer, guard)) => (writer, Some(guard), None),
            Err(e) => (BoxMakeWriter::new(std::io::stdout), None, Some(e)),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(folder == STDOUT);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }

    if let Some(e) = fallback {
        warn!(%folder, error = %e, "log folder unusable, logging to stdout");
    }
    LogGuard { _guard: guard }
}

fn file_writer(dir: &Path) -> std::io::Result<(BoxMakeWriter, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .map_err(std::io::Error::other)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(non_blocking), guard))
}
