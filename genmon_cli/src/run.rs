use crate::config;
use crate::error_fmt::CliError;
use crate::notify::LogNotifier;
use eyre::WrapErr;
use genmon_config::Config;
use genmon_core::commands::{self, Resolved};
use genmon_core::{CommandServer, Monitor};
use genmon_traits::MonotonicClock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const IDLE_POLL: Duration = Duration::from_millis(200);

fn start_monitor(cfg: Config, path: &Path) -> eyre::Result<Arc<Monitor>> {
    let path: PathBuf = path.to_path_buf();
    Monitor::start(
        cfg,
        Box::new(config::open_transport),
        Box::new(move || config::load(&path)),
        Arc::new(LogNotifier),
        Arc::new(MonotonicClock::new()),
    )
}

/// Serve until Ctrl-C.
pub fn run_daemon(cfg: Config, path: &Path) -> eyre::Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    let (host, port) = (cfg.server.bind.clone(), cfg.server.port);
    let monitor = start_monitor(cfg, path)?;
    let server = match CommandServer::bind(monitor.clone(), &host, port) {
        Ok(s) => s,
        Err(e) => {
            monitor.shutdown();
            return Err(e);
        }
    };
    tracing::info!(addr = %server.local_addr(), "genmon running; Ctrl-C to stop");

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(IDLE_POLL);
    }
    tracing::info!("shutdown requested");
    drop(server);
    monitor.shutdown();
    Ok(())
}

/// Start, wait for the first full read, answer one command item, stop.
pub fn run_query(cfg: Config, path: &Path, item: &str, wait_secs: u64, json: bool) -> eyre::Result<String> {
    let monitor = start_monitor(cfg, path)?;
    let deadline = Instant::now() + Duration::from_secs(wait_secs);
    while !monitor.device().is_initialized() {
        if Instant::now() >= deadline {
            monitor.shutdown();
            return Err(CliError::StartupTimeout(wait_secs).into());
        }
        std::thread::sleep(IDLE_POLL);
    }

    let report = match commands::resolve(item, true) {
        Resolved::Verb(verb) => monitor.report(verb),
        _ => None,
    };
    let out = match report {
        Some(node) if json => node.to_json_pretty(),
        Some(node) => node.to_text(),
        None => {
            let reply = monitor.process_command(&format!("{} {item}", commands::PREFIX), true);
            reply
                .strip_suffix(commands::END_OF_MESSAGE)
                .unwrap_or(reply.as_str())
                .to_string()
        }
    };
    monitor.shutdown();
    Ok(out)
}
