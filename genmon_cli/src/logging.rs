//! Subscriber setup: console layer plus an optional JSON-lines file layer.

use crate::cli::FILE_GUARD;
use genmon_config::Logging;
use std::path::Path;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Console output goes to stderr so query
/// results on stdout stay machine-readable.
pub fn init(json: bool, cli_level: Option<&str>, cfg: &Logging) -> eyre::Result<()> {
    let level = cli_level.or(cfg.level.as_deref()).unwrap_or("info");

    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter(level))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(true)
            .with_filter(filter(level))
            .boxed()
    };

    let file = match cfg.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            std::fs::create_dir_all(dir)?;
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("genmon.log");
            let appender = match cfg.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_thread_names(true)
                    .with_filter(filter(level))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}
