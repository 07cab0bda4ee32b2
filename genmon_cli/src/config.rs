//! Config file loading and the controller link the binary opens.

use crate::error_fmt::CliError;
use eyre::WrapErr;
use genmon_config::{Config, TransportKind};
use genmon_hardware::{RtuTransport, SimulatedController};
use genmon_traits::Transport;
use std::path::Path;
use std::time::Duration;

/// Read, parse and validate the TOML config at `path`.
pub fn load(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let invalid = |reason: String| CliError::InvalidConfig {
        path: path.display().to_string(),
        reason,
    };
    let cfg: Config = toml::from_str(&text).map_err(|e| invalid(e.message().to_string()))?;
    cfg.validate().map_err(|e| invalid(e.to_string()))?;
    Ok(cfg)
}

/// Open the link described by `[transport]`.
pub fn open_transport(cfg: &Config) -> eyre::Result<Box<dyn Transport>> {
    let t = &cfg.transport;
    match t.kind {
        TransportKind::Sim => {
            tracing::info!(controller = t.sim_controller, "using simulated controller");
            Ok(Box::new(SimulatedController::preset(t.sim_controller)))
        }
        TransportKind::Tcp => {
            let link = RtuTransport::connect_tcp(
                &t.host,
                t.port,
                t.slave_address,
                Duration::from_millis(t.timeout_ms),
            )
            .wrap_err_with(|| format!("open controller link {}:{}", t.host, t.port))?;
            Ok(Box::new(link))
        }
    }
}
