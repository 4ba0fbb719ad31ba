//! Log setup for the server and the operator tools.
//!
//! Events are printed to stdout and mirrored into a log file. `DOCSIFT_LOG_FILE` selects a single
//! append-only file; without it docsift rotates `logs/docsift.log` daily. Disk writes go through
//! a background worker so request handling never blocks on logging.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "DOCSIFT_LOG_FILE";
const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "docsift.log";

/// Flushes buffered file output on exit; must live as long as the process.
static FILE_WORKER: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
///
/// When no log file can be opened docsift keeps running with stdout logging only.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false).compact();
    let file = file_writer().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .compact()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}

fn file_writer() -> Option<NonBlocking> {
    let writer = match std::env::var(LOG_FILE_ENV) {
        Ok(path) => append_to(Path::new(&path))?,
        Err(_) => daily_rotation()?,
    };
    let (non_blocking, guard) = writer;
    let _ = FILE_WORKER.set(guard);
    Some(non_blocking)
}

fn append_to(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(tracing_appender::non_blocking)
        .map_err(|err| eprintln!("docsift: cannot open log file {}: {err}", path.display()))
        .ok()
}

fn daily_rotation() -> Option<(NonBlocking, WorkerGuard)> {
    if let Err(err) = std::fs::create_dir_all(LOG_DIR) {
        eprintln!("docsift: cannot create {LOG_DIR}/: {err}");
        return None;
    }
    let appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
    Some(tracing_appender::non_blocking(appender))
}
