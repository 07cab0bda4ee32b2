//! Controller event log decoding.
//!
//! Records are `AABBCCDDEEFFGGHH[IIJJ]`: code, sequence, minute, hour, month,
//! seconds, year, day and, on the Evolution alarm log, a four digit alarm
//! code. An out-of-range month or day marks the end of the log.

use crate::decode::alarm_info;
use crate::identity::Identity;
use crate::registers::{LogWindow, reg_name};
use crate::report::Node;
use crate::store::RegisterView;
use genmon_config::AlarmCatalog;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogDecodeError {
    #[error("log record length {0} outside 16..=20")]
    Length(usize),
    #[error("log record is not hex")]
    NotHex,
    #[error("log record minute {0} out of range")]
    Minute(u8),
    #[error("log record hour {0} out of range")]
    Hour(u8),
    #[error("log record seconds {0} out of range")]
    Seconds(u8),
    #[error("{0:?} log window does not exist on this controller")]
    WrongFamily(LogWindow),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    pub code: u8,
    pub sequence: u8,
    pub minute: u8,
    pub hour: u8,
    pub month: u8,
    pub day: u8,
    pub year: u8,
    pub seconds: u8,
    pub alarm_code: Option<u16>,
}

fn byte_at(raw: &str, at: usize) -> Result<u8, LogDecodeError> {
    raw.get(at..at + 2)
        .and_then(|s| u8::from_str_radix(s, 16).ok())
        .ok_or(LogDecodeError::NotHex)
}

/// Decode one record. `Ok(None)` means the slot holds no entry.
pub fn parse_record(raw: &str) -> Result<Option<LogRecord>, LogDecodeError> {
    if !(16..=20).contains(&raw.len()) {
        return Err(LogDecodeError::Length(raw.len()));
    }
    let month = byte_at(raw, 8)?;
    if month == 0 || month > 12 {
        return Ok(None);
    }
    let minute = byte_at(raw, 4)?;
    if minute > 59 {
        return Err(LogDecodeError::Minute(minute));
    }
    let hour = byte_at(raw, 6)?;
    if hour > 23 {
        return Err(LogDecodeError::Hour(hour));
    }
    let seconds = byte_at(raw, 10)?;
    if seconds > 59 {
        return Err(LogDecodeError::Seconds(seconds));
    }
    let day = byte_at(raw, 14)?;
    if day == 0 || day > 31 {
        return Ok(None);
    }
    let alarm_code = if raw.len() > 16 {
        let code = raw
            .get(16..20)
            .and_then(|s| u16::from_str_radix(s, 16).ok())
            .ok_or(LogDecodeError::NotHex)?;
        Some(code)
    } else {
        None
    };
    Ok(Some(LogRecord {
        code: byte_at(raw, 0)?,
        sequence: byte_at(raw, 2)?,
        minute,
        hour,
        month,
        day,
        year: byte_at(raw, 12)?,
        seconds,
        alarm_code,
    }))
}

const START_LOG: &[(u8, &str)] = &[
    (0x28, "Switched Off"),
    (0x29, "Running - Manual"),
    (0x2a, "Stopped - Auto"),
    (0x2b, "Running - Utility Loss"),
    (0x2c, "Running - 2 Wire Start"),
    (0x2d, "Running - Remote Start"),
    (0x2e, "Running - Exercise"),
    (0x2f, "Stopped - Alarm"),
];

const SERVICE_LOG: &[(u8, &str)] = &[
    (0x16, "Service Schedule B"),
    (0x17, "Service Schedule A"),
    (0x18, "Inspect Battery"),
    (0x3c, "Schedule B Serviced"),
    (0x3d, "Schedule A Serviced"),
    (0x3e, "Battery Maintained"),
    (0x3f, "Maintenance Reset"),
];

const ALARM_LOG_EVO_LC: &[(u8, &str)] = &[
    (0x04, "RPM Sense Loss"),
    (0x06, "Low Coolant Level"),
    (0x47, "Low Fuel Level"),
    (0x1b, "Low Fuel Level"),
    (0x46, "Ruptured Tank"),
    (0x49, "Hall Calibration Error"),
];

// Warnings on air cooled Evolution carry alarm code 0000.
const ALARM_LOG_EVO_AC: &[(u8, &str)] = &[
    (0x13, "FIRMWARE ERROR-25"),
    (0x14, "Low Battery"),
    (0x15, "Exercise Set Error"),
    (0x16, "Service Schedule B"),
    (0x17, "Service Schedule A "),
    (0x18, "Inspect Battery"),
    (0x19, "SEEPROM ABUSE"),
    (0x1c, "Stopping....."),
    (0x1d, "FIRMWARE ERROR-9"),
    (0x1e, "Fuel Pressure"),
    (0x1f, "Battery Problem"),
    (0x20, "Charger Warning"),
    (0x21, "Charger Missing AC"),
    (0x22, "Overload Warning"),
    (0x23, "Overload Cooldown"),
    (0x25, "VSCF Warning"),
    (0x26, "USB Warning"),
    (0x27, "Download Failure"),
    (0x28, "High Engine Temp"),
    (0x29, "Low Oil Pressure"),
    (0x2a, "Overcrank"),
    (0x2b, "Overspeed"),
    (0x2c, "RPM Sense Loss"),
    (0x2d, "Underspeed"),
    (0x2e, "Controller Fault"),
    (0x2f, "FIRMWARE ERROR-7"),
    (0x30, "WIRING ERROR"),
    (0x31, "Over Voltage"),
    (0x32, "Under Voltage"),
    (0x33, "Overload Remove Load"),
    (0x34, "Low Volts Remove Load"),
    (0x35, "Stepper Over Current"),
    (0x36, "Fuse Problem"),
    (0x39, "Loss of Speed Signal"),
    (0x3a, "Loss of Serial Link "),
    (0x3b, "VSCF Alarm"),
    (0x3c, "Schedule B Serviced"),
    (0x3d, "Schedule A Serviced"),
    (0x3e, "Battery Maintained"),
    (0x3f, "Maintenance Reset"),
];

const NEXUS_ALARM_LOG: &[(u8, &str)] = &[
    (0x00, "High Engine Temperature"),
    (0x01, "Low Oil Pressure"),
    (0x02, "Overcrank"),
    (0x03, "Overspeed"),
    (0x04, "RPM Sense Loss"),
    (0x0b, "Low Cooling Fluid"),
    (0x0c, "Canbus Error"),
    (0x0f, "Govenor Fault"),
    (0x14, "Low Battery"),
    (0x17, "Inspect Air Filter"),
    (0x1b, "Check Battery"),
    (0x1e, "Low Fuel Pressure"),
    (0x21, "Service Schedule A"),
    (0x22, "Service Schedule B"),
];

fn table_for(window: LogWindow, id: Identity) -> &'static [(u8, &'static str)] {
    match window {
        LogWindow::Start => START_LOG,
        LogWindow::NexusAlarm => NEXUS_ALARM_LOG,
        LogWindow::Alarm | LogWindow::Service if id.is_evo_ac() => ALARM_LOG_EVO_AC,
        LogWindow::Alarm => ALARM_LOG_EVO_LC,
        LogWindow::Service => SERVICE_LOG,
    }
}

pub fn window_title(window: LogWindow) -> &'static str {
    match window {
        LogWindow::Alarm | LogWindow::NexusAlarm => "Alarm Log",
        LogWindow::Service => "Service Log",
        LogWindow::Start => "Start Stop Log",
    }
}

/// Windows in report order for a controller family.
pub fn display_windows(id: Identity) -> &'static [LogWindow] {
    if id.evolution {
        &[LogWindow::Alarm, LogWindow::Service, LogWindow::Start]
    } else {
        &[LogWindow::NexusAlarm, LogWindow::Start]
    }
}

/// Decode a record into its display line, or `Ok(None)` for an empty slot.
pub fn format_entry(
    raw: &str,
    window: LogWindow,
    id: Identity,
    catalog: &AlarmCatalog,
) -> Result<Option<String>, LogDecodeError> {
    let Some(rec) = parse_record(raw)? else {
        return Ok(None);
    };
    if window == LogWindow::NexusAlarm && id.evolution {
        return Err(LogDecodeError::WrongFamily(window));
    }

    let mut label = table_for(window, id)
        .iter()
        .find(|(c, _)| *c == rec.code)
        .map_or_else(|| format!("Unknown 0x{:02X}", rec.code), |(_, s)| (*s).to_string());

    if window == LogWindow::Alarm
        && id.evolution
        && label.to_lowercase().contains("unknown")
        && let Some(code_hex) = raw.get(16..20)
    {
        let name = alarm_info(catalog, id, code_hex, true);
        if !name.to_lowercase().contains("unknown") {
            label = name;
        }
    }

    let mut line = format!(
        "{:02}/{:02}/{:02} {:02}:{:02}:{:02} {} ",
        rec.month, rec.day, rec.year, rec.hour, rec.minute, rec.seconds, label
    );
    if let Some(code) = rec.alarm_code {
        line.push_str(&format!(": Alarm Code: {code:04}"));
    }
    Ok(Some(line))
}

/// Display form of [`format_entry`]: empty for no entry or a bad record.
pub fn render_entry(raw: &str, window: LogWindow, id: Identity, catalog: &AlarmCatalog) -> String {
    match format_entry(raw, window, id, catalog) {
        Ok(line) => line.unwrap_or_default(),
        Err(e @ LogDecodeError::WrongFamily(_)) => {
            tracing::error!(error = %e, "log decode");
            "Error Parsing Log Entry".to_string()
        }
        Err(e) => {
            tracing::warn!(error = %e, record = raw, "log decode");
            String::new()
        }
    }
}

fn one_entry(
    view: &impl RegisterView,
    address: u16,
    window: LogWindow,
    id: Identity,
    catalog: &AlarmCatalog,
    raw_output: bool,
) -> Option<String> {
    let value = view.value(address)?;
    Some(if raw_output {
        format!("{}:{value}", reg_name(address))
    } else {
        render_entry(value, window, id, catalog)
    })
}

/// Log report plus whether any entry could not be named.
#[derive(Debug, Clone, PartialEq)]
pub struct LogListing {
    pub node: Node,
    pub unknown_found: bool,
}

const UNKNOWN_NOTE: &str = "\nThe output appears to have unknown values. \
Please see the following threads to resolve these issues:\
\n        https://github.com/jgyates/genmon/issues/12\
\n        https://github.com/jgyates/genmon/issues/13";

/// Build `{"Logs": [{title: entries}, ...]}`.
///
/// With `all` every record up to the first empty slot is listed; otherwise
/// only the newest entry of each window.
pub fn display_logs(
    view: &impl RegisterView,
    id: Identity,
    catalog: &AlarmCatalog,
    all: bool,
    raw_output: bool,
) -> LogListing {
    let mut logs = Vec::new();
    let mut unknown_found = false;

    for &window in display_windows(id) {
        let title = window_title(window);
        let mut entry = Node::map();
        if all {
            let mut lines = Vec::new();
            for address in window.records() {
                match one_entry(view, address, window, id, catalog, raw_output) {
                    Some(line) if !line.is_empty() => lines.push(line),
                    _ => break,
                }
            }
            unknown_found |= lines.iter().any(|l| l.to_lowercase().contains("unknown"));
            entry.push(title, Node::List(lines.into_iter().map(Node::Value).collect()));
        } else if let Some(line) = one_entry(view, window.start(), window, id, catalog, raw_output) {
            unknown_found |= line.to_lowercase().contains("unknown");
            entry.push_value(title, line);
        }
        logs.push(entry);
    }

    let mut node = Node::map().with("Logs", Node::List(logs));
    if unknown_found {
        node.push_value("Note", UNKNOWN_NOTE);
    }
    LogListing {
        node,
        unknown_found,
    }
}
