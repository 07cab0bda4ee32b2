#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and alarm catalog parsing for the generator monitor.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - The alarm catalog loader reads the `!`-separated alarm description file
//!   used to name controller alarm codes.
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Site {
    /// Shown in notice subjects and the `getsitename` reply
    pub name: String,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            name: "Home".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-memory simulated controller
    #[default]
    Sim,
    /// Modbus-RTU over a TCP serial bridge
    Tcp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportCfg {
    pub kind: TransportKind,
    pub host: String,
    pub port: u16,
    /// Modbus slave address of the controller
    pub slave_address: u8,
    /// Per-transaction timeout (ms)
    pub timeout_ms: u64,
    /// Controller code the simulator pretends to be (0x03, 0x06, 0x09, 0x0c)
    pub sim_controller: u8,
}

impl Default for TransportCfg {
    fn default() -> Self {
        Self {
            kind: TransportKind::Sim,
            host: "127.0.0.1".to_string(),
            port: 8899,
            slave_address: 0x9d,
            timeout_ms: 3000,
            sim_controller: 0x09,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ControllerCfg {
    /// Force Evolution (true) or Nexus (false); detected when absent
    pub evolution: Option<bool>,
    /// Force liquid (true) or air (false) cooling; detected when absent
    pub liquid_cooled: Option<bool>,
    /// Controller firmware supports biweekly and monthly exercise
    pub enhanced_exercise: bool,
    /// Use the index-register exercise write instead of 002c/002e
    pub legacy_write: bool,
    pub nominal_frequency: Option<u32>,
    pub nominal_rpm: Option<u32>,
    pub nominal_kw: Option<u32>,
    pub model: Option<String>,
    pub fuel_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorCfg {
    pub disable_outage_check: bool,
    /// Include unsupported sensors in the status report
    pub display_unknown: bool,
    /// Keep the controller clock in sync with the host every hour
    pub sync_time: bool,
    /// Reset the controller clock on a daylight saving change
    pub sync_dst: bool,
    /// Re-read the log windows whenever the alarm register changes
    pub poll_logs: bool,
    /// Send feedback records through the notifier instead of saving them
    pub feedback_enabled: bool,
    /// Probe unknown registers after every sweep
    pub debug_scan: bool,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            disable_outage_check: false,
            display_unknown: false,
            sync_time: false,
            sync_dst: false,
            poll_logs: true,
            feedback_enabled: false,
            debug_scan: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerCfg {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 9082,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Closed outage records; disabled when absent
    pub outage_log: Option<PathBuf>,
    /// kW samples; the power meter is disabled when absent
    pub power_log: Option<PathBuf>,
    /// `!`-separated alarm descriptions
    pub alarm_file: Option<PathBuf>,
    pub feedback_file: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            outage_log: Some(PathBuf::from("outage.txt")),
            power_log: None,
            alarm_file: None,
            feedback_file: PathBuf::from("feedback.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PowerCfg {
    /// The power log is reset once it grows past this size
    pub max_log_mb: f64,
    /// Samples older than this are dropped by the daily prune
    pub prune_minutes: u64,
    pub sample_secs: u64,
}

impl Default for PowerCfg {
    fn default() -> Self {
        Self {
            max_log_mb: 15.0,
            prune_minutes: 43_800,
            sample_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub site: Site,
    pub transport: TransportCfg,
    pub controller: ControllerCfg,
    pub monitor: MonitorCfg,
    pub server: ServerCfg,
    pub paths: Paths,
    pub power: PowerCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.site.name.trim().is_empty() {
            eyre::bail!("site.name must not be empty");
        }

        // Transport
        if self.transport.timeout_ms == 0 {
            eyre::bail!("transport.timeout_ms must be >= 1");
        }
        if self.transport.timeout_ms > 60_000 {
            eyre::bail!("transport.timeout_ms is unreasonably large (>60s)");
        }
        if self.transport.kind == TransportKind::Tcp {
            if self.transport.host.trim().is_empty() {
                eyre::bail!("transport.host must be set for kind = \"tcp\"");
            }
            if self.transport.port == 0 {
                eyre::bail!("transport.port must be > 0");
            }
        }
        if !matches!(self.transport.sim_controller, 0x03 | 0x06 | 0x09 | 0x0c) {
            eyre::bail!("transport.sim_controller must be one of 3, 6, 9 or 12");
        }

        // Controller
        if let Some(hz) = self.controller.nominal_frequency
            && hz != 50
            && hz != 60
        {
            eyre::bail!("controller.nominal_frequency must be 50 or 60");
        }
        if self.controller.nominal_rpm == Some(0) {
            eyre::bail!("controller.nominal_rpm must be > 0");
        }
        if self.controller.nominal_kw == Some(0) {
            eyre::bail!("controller.nominal_kw must be > 0");
        }
        if self.controller.evolution == Some(false) && self.controller.enhanced_exercise {
            eyre::bail!("controller.enhanced_exercise requires an Evolution controller");
        }

        // Server
        if self.server.port == 0 {
            eyre::bail!("server.port must be > 0");
        }
        if self.server.bind.trim().is_empty() {
            eyre::bail!("server.bind must not be empty");
        }

        // Power
        if !(self.power.max_log_mb.is_finite() && self.power.max_log_mb > 0.0) {
            eyre::bail!("power.max_log_mb must be > 0");
        }
        if self.power.prune_minutes == 0 {
            eyre::bail!("power.prune_minutes must be >= 1");
        }
        if self.power.sample_secs == 0 {
            eyre::bail!("power.sample_secs must be >= 1");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily or hourly");
        }

        Ok(())
    }
}

/// One line of the alarm description file.
///
/// Format: `code!flag!name!description!additional`, code in decimal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlarmEntry {
    pub code: u32,
    pub flag: String,
    pub name: String,
    pub description: String,
    pub additional: String,
}

/// Alarm descriptions keyed by decimal alarm code.
#[derive(Debug, Clone, Default)]
pub struct AlarmCatalog {
    entries: HashMap<u32, AlarmEntry>,
}

impl AlarmCatalog {
    /// Parse catalog text. Comment lines (`#`), blank lines and lines
    /// without exactly five fields are skipped.
    pub fn from_reader<R: Read>(reader: R) -> eyre::Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'!')
            .comment(Some(b'#'))
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .quoting(false)
            .from_reader(reader);

        let mut entries = HashMap::new();
        for rec in rdr.records() {
            let rec = rec.map_err(|e| eyre::eyre!("read alarm catalog: {e}"))?;
            if rec.len() != 5 {
                continue;
            }
            let Ok(code) = rec[0].parse::<u32>() else {
                continue;
            };
            entries.insert(
                code,
                AlarmEntry {
                    code,
                    flag: rec[1].to_string(),
                    name: rec[2].to_string(),
                    description: rec[3].to_string(),
                    additional: rec[4].to_string(),
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn get(&self, code: u32) -> Option<&AlarmEntry> {
        self.entries.get(&code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn load_alarm_catalog(path: &Path) -> eyre::Result<AlarmCatalog> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open alarm catalog {:?}: {}", path, e))?;
    AlarmCatalog::from_reader(file)
}
