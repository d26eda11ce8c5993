//! Tracing subscriber setup.
//!
//! Logs go to a daily-rolling file under `<arc_home>/logs/`; verbosity
//! comes from `RUST_LOG` (default `info`). All `log::` call sites are
//! forwarded into the tracing pipeline.

use std::{path::Path, sync::OnceLock};

// Keeps the non-blocking writer alive for the lifetime of the process.
static GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

pub fn init(log_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "arc.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false), // no colour escape codes in log files
        )
        .try_init()
        .ok();

    // Forward log:: macro call sites into the tracing pipeline.
    tracing_log::LogTracer::init().ok();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "arc started");
}
