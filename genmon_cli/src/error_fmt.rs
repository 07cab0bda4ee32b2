//! Human-readable error descriptions and structured JSON error formatting.

use genmon_core::GenmonError;
use genmon_hardware::error::TransportError;
use thiserror::Error;

/// Failures the binary itself classifies before handing them to `humanize`.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid configuration in {path}: {reason}")]
    InvalidConfig { path: String, reason: String },
    #[error("monitor did not finish start-up within {0} s")]
    StartupTimeout(u64),
}

fn find<'a, T: std::error::Error + 'static>(err: &'a eyre::Report) -> Option<&'a T> {
    err.chain().find_map(|c| c.downcast_ref::<T>())
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = find::<CliError>(err) {
        return match ce {
            CliError::InvalidConfig { path, reason } => format!(
                "What happened: Invalid configuration ({reason}).\nLikely causes: Missing, mistyped or out-of-range values in {path}.\nHow to fix: Edit the config file, then run `genmon check` until it passes."
            ),
            CliError::StartupTimeout(secs) => format!(
                "What happened: The controller was not fully read within {secs} s.\nLikely causes: Wrong slave address, a slow serial bridge, or no controller attached.\nHow to fix: Check [transport] in the config or raise --wait-secs."
            ),
        };
    }

    if let Some(te) = find::<TransportError>(err) {
        return match te {
            TransportError::Timeout => "What happened: The controller did not answer in time.\nLikely causes: Serial bridge unreachable, wrong slave address, or timeout configured too low.\nHow to fix: Verify [transport] host/port and slave_address, and consider raising transport.timeout_ms.".to_string(),
            TransportError::Io(e) => format!(
                "What happened: Could not open the link to the controller ({e}).\nLikely causes: Serial bridge is down or host/port are wrong.\nHow to fix: Check [transport] host and port, then retry."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: Line noise or a second master on the bus.\nHow to fix: Re-run with --log-level=debug and check the wiring."
            ),
        };
    }

    if let Some(ge) = find::<GenmonError>(err) {
        return format!(
            "What happened: {ge}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("bind command server") {
        return format!(
            "What happened: The command socket could not be opened ({msg}).\nLikely causes: Another monitor already listens on that port.\nHow to fix: Stop the other instance or change [server] port."
        );
    }
    if lower.contains("connect to monitor") {
        return format!(
            "What happened: No monitor answered ({msg}).\nLikely causes: `genmon run` is not running or listens elsewhere.\nHow to fix: Start the monitor or pass --host/--port."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 config, 4 controller link, 5 start-up timeout, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = find::<CliError>(err) {
        return match ce {
            CliError::InvalidConfig { .. } => 3,
            CliError::StartupTimeout(_) => 5,
        };
    }
    if find::<TransportError>(err).is_some()
        || matches!(find::<GenmonError>(err), Some(GenmonError::Connection(_)))
    {
        return 4;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match find::<CliError>(err) {
        Some(CliError::InvalidConfig { .. }) => "InvalidConfig",
        Some(CliError::StartupTimeout(_)) => "StartupTimeout",
        None if exit_code_for_error(err) == 4 => "Link",
        None => "Error",
    };
    json!({ "reason": reason, "code": exit_code_for_error(err), "message": humanize(err) })
        .to_string()
}
