//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "genmon", version, about = "Generator monitor")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/genmon.toml")]
    pub config: PathBuf,

    /// Log as JSON lines and print query results as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the controller and serve the command socket until interrupted
    Run,
    /// Start against the controller, print one report and exit
    Query {
        /// Command item, e.g. `status`, `logs`, `getregvalue=0001`
        item: String,
        /// Seconds to wait for the first full register sweep
        #[arg(long, value_name = "SECS", default_value_t = 30)]
        wait_secs: u64,
    },
    /// Validate the config (and alarm file, if set) without touching the controller
    Check,
    /// Talk to a running monitor over its command socket
    Client {
        /// Server host (defaults to [server] bind, loopback for wildcard binds)
        #[arg(long)]
        host: Option<String>,
        /// Server port (defaults to [server] port)
        #[arg(long)]
        port: Option<u16>,
        /// Commands to send; reads stdin line by line when none are given
        commands: Vec<String>,
    },
}
