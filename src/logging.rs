use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Keeps the non-blocking file writer alive for the duration of the run.
#[allow(dead_code)]
pub struct LoggerGuard(Option<WorkerGuard>);

/// Initialize tracing with a console layer and an optional daily-rolling
/// file layer. `RUST_LOG` overrides the configured level.
pub fn init_logging(log_dir: Option<&Path>, prefix: &str, level: &str) -> anyhow::Result<LoggerGuard> {
    let level = match level {
        "trace" | "debug" | "info" | "warn" | "error" => level,
        _ => "info",
    };

    let default_directive: Directive = level.parse()?;
    let console_filter = EnvFilter::builder()
        .with_default_directive(default_directive.clone())
        .parse_lossy(std::env::var("RUST_LOG").unwrap_or_default());

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_filter(console_filter);

    let registry = tracing_subscriber::registry().with(stdout_layer);

    let guard = if let Some(log_dir) = log_dir {
        let file_filter = EnvFilter::builder()
            .with_default_directive(default_directive)
            .parse_lossy(std::env::var("RUST_LOG").unwrap_or_default());
        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .build(log_dir)?;
        let (non_blocking, guard) = NonBlocking::new(file_appender);
        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(file_filter);
        registry.with(file_layer).init();
        Some(guard)
    } else {
        registry.init();
        None
    };

    Ok(LoggerGuard(guard))
}
