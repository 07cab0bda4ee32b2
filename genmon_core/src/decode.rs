//! State decoders: pure functions over a register view.
//!
//! Text-returning helpers yield an empty string when the registers they need
//! have not been read yet, so report builders can show a blank field instead
//! of failing.

use crate::identity::Identity;
use crate::registers::MODEL_REG;
use crate::store::RegisterView;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use genmon_config::AlarmCatalog;
use std::fmt;

/// One-word register value.
pub fn reg_u16(view: &impl RegisterView, address: u16) -> Option<u16> {
    let v = view.value(address)?;
    if v.len() != 4 {
        return None;
    }
    u16::from_str_radix(v, 16).ok()
}

/// The 32-bit alarm and status register (0001).
pub fn status_u32(view: &impl RegisterView) -> Option<u32> {
    let v = view.value(0x0001)?;
    if v.len() != 8 {
        return None;
    }
    u32::from_str_radix(v, 16).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Auto,
    Off,
    Manual,
    /// Seen momentarily while stopping through the two-wire input.
    TwoWireStop,
    Alarm,
}

impl SwitchState {
    pub fn from_status(status: u32) -> Self {
        match status & 0x0000_ffff {
            0x00 => Self::Auto,
            0x07 => Self::Off,
            0x06 => Self::Manual,
            0x17 => Self::TwoWireStop,
            _ => Self::Alarm,
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "Auto",
            Self::Off => "Off",
            Self::Manual => "Manual",
            Self::TwoWireStop => "Two Wire Stop",
            Self::Alarm => "System in Alarm",
        })
    }
}

pub fn switch_state(view: &impl RegisterView) -> Option<SwitchState> {
    status_u32(view).map(SwitchState::from_status)
}

pub fn in_alarm(view: &impl RegisterView) -> bool {
    switch_state(view) == Some(SwitchState::Alarm)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    OffReady,
    StartupDelay,
    Cranking { alarm: bool },
    Running { alarm: bool },
    Exercising,
    CoolingDown,
    RunningInWarning,
    StoppedInAlarm,
    Stopped,
    Unknown(u32),
}

impl EngineState {
    pub fn from_status(status: u32) -> Self {
        let alarm = SwitchState::from_status(status) == SwitchState::Alarm;
        match (status & 0x000f_0000) >> 16 {
            0x0 => Self::OffReady,
            0x1 => Self::StartupDelay,
            0x2 => Self::Cranking { alarm },
            0x3 => Self::Running { alarm },
            0x4 => Self::Exercising,
            0x5 => Self::CoolingDown,
            0x6 => Self::RunningInWarning,
            0x8 => Self::StoppedInAlarm,
            0x9 => Self::Stopped,
            _ => Self::Unknown(status),
        }
    }

    /// Stopped or off: no output current, power or charging decisions.
    pub fn is_stopped(self) -> bool {
        matches!(self, Self::OffReady | Self::Stopped | Self::StoppedInAlarm)
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Running { .. } | Self::RunningInWarning)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OffReady => f.write_str("Off - Ready"),
            Self::StartupDelay => f.write_str("Startup Delay Timer Activated"),
            Self::Cranking { alarm: false } => f.write_str("Cranking"),
            Self::Cranking { alarm: true } => f.write_str("Cranking in Alarm"),
            Self::Running { alarm: false } => f.write_str("Running"),
            Self::Running { alarm: true } => f.write_str("Running in Alarm"),
            Self::Exercising => f.write_str("Exercising"),
            Self::CoolingDown => f.write_str("Cooling Down"),
            Self::RunningInWarning => f.write_str("Running in Warning"),
            Self::StoppedInAlarm => f.write_str("Stopped in Alarm"),
            Self::Stopped => f.write_str("Stopped"),
            Self::Unknown(v) => write!(f, "UNKNOWN: {v:08x}"),
        }
    }
}

pub fn engine_state(view: &impl RegisterView) -> Option<EngineState> {
    status_u32(view).map(EngineState::from_status)
}

fn text<T: fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

pub fn switch_text(view: &impl RegisterView) -> String {
    text(switch_state(view))
}

pub fn engine_text(view: &impl RegisterView) -> String {
    text(engine_state(view))
}

/// Stopped, off, or status not yet known.
fn engine_idle(view: &impl RegisterView) -> bool {
    engine_state(view).is_none_or(EngineState::is_stopped)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmState {
    /// Name from the alarm catalog for the last alarm code (05f1).
    Catalog(String),
    Known(&'static str),
    Unknown(u32),
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog(s) => f.write_str(s),
            Self::Known(s) => f.write_str(s),
            Self::Unknown(v) => write!(f, "UNKNOWN ALARM: {v:08x}"),
        }
    }
}

const ALARM_CODES: &[(u32, &str)] = &[
    (0x01, "Low Battery"),
    (0x08, "Low Coolant"),
    (0x0d, "RPM Sense Loss"),
    (0x1f, "Service Due"),
    (0x20, "Service Complete"),
    (0x30, "Ruptured Tank"),
    (0x31, "Low Fuel Level"),
    (0x34, "Emergency Stop"),
    (0x14, "Check Battery"),
];

/// Active alarm, or `None` while the switch state is not in alarm.
pub fn alarm_state(
    view: &impl RegisterView,
    id: Identity,
    catalog: &AlarmCatalog,
) -> Option<AlarmState> {
    let status = status_u32(view)?;
    if SwitchState::from_status(status) != SwitchState::Alarm {
        return None;
    }
    if id.evolution
        && let Some(code) = view.value(0x05f1)
        && code.len() == 4
    {
        let name = alarm_info(catalog, id, code, true);
        if !name.to_lowercase().contains("unknown") {
            return Some(AlarmState::Catalog(name));
        }
    }
    let low = status & 0x0000_ffff;
    Some(
        ALARM_CODES
            .iter()
            .find(|(c, _)| *c == low)
            .map_or(AlarmState::Unknown(status), |(_, s)| AlarmState::Known(s)),
    )
}

/// Describe an alarm code (hex text) from the catalog.
///
/// `name_only` yields just the alarm name; otherwise a multi-line
/// description. Only Evolution controllers report alarm codes.
pub fn alarm_info(catalog: &AlarmCatalog, id: Identity, code_hex: &str, name_only: bool) -> String {
    if !id.evolution {
        return String::new();
    }
    let Ok(code) = u32::from_str_radix(code_hex, 16) else {
        return format!("Error Code Unknown: {code_hex}\n");
    };
    if code == 0 {
        return if name_only {
            "Warning Code Unknown: 0".to_string()
        } else {
            "Error Code 0000: No alarms occured since controller has been power cycled.\n"
                .to_string()
        };
    }
    match catalog.get(code) {
        Some(e) if name_only => e.name.clone(),
        Some(e) => format!(
            "{}, Error Code: {}\n    Description: {}\n    Additional Info: {}\n",
            e.name, e.code, e.description, e.additional
        ),
        None => format!("Error Code Unknown: {code:04}\n"),
    }
}

/// `(mask, active_when_set, label)` rows, rendered in table order.
type BitTable = [(u16, bool, &'static str)];

fn digital_values(value: u16, table: &BitTable) -> String {
    table
        .iter()
        .filter(|(mask, polarity, _)| (value & mask == *mask) == *polarity)
        .map(|(_, _, label)| *label)
        .collect::<Vec<_>>()
        .join(", ")
}

const OUTPUTS_EVO_LC: &BitTable = &[
    (0x01, true, "Transfer Switch Activated"),
    (0x02, true, "Fuel Enrichment On"),
    (0x04, true, "Starter On"),
    (0x08, true, "Fuel Relay On"),
    (0x10, true, "Battery Charger On"),
    (0x20, true, "Alarm Active"),
    (0x40, true, "Bosch Governor On"),
    (0x80, true, "Air/Fuel Relay On"),
];

/// Active output relays (0053), Evolution liquid cooled only.
pub fn digital_outputs(view: &impl RegisterView, id: Identity) -> String {
    if !id.is_evo_lc() {
        return String::new();
    }
    reg_u16(view, 0x0053).map_or_else(String::new, |v| digital_values(v, OUTPUTS_EVO_LC))
}

/// Active sensor inputs (0052), Evolution liquid cooled only.
///
/// Bit 0x0200 reads as low fuel pressure on diesel units and as an inverted
/// fuel-level switch on gas units.
pub fn sensor_inputs(view: &impl RegisterView, id: Identity, fuel_type: &str) -> String {
    if !id.is_evo_lc() {
        return String::new();
    }
    let Some(v) = reg_u16(view, 0x0052) else {
        return String::new();
    };
    let fuel_bit = if fuel_type.to_lowercase().contains("diesel") {
        (0x0200, true, "Fuel Pressure / Level Low")
    } else {
        (0x0200, false, "Fuel below 5 inch")
    };
    let table = [
        (0x0001, true, "Manual Button"),
        (0x0002, true, "Auto Button"),
        (0x0004, true, "Off Button"),
        (0x0008, true, "2 Wire Start"),
        (0x0010, true, "Wiring Error"),
        (0x0020, true, "Ruptured Basin"),
        (0x0040, false, "E-Stop Activated"),
        (0x0080, true, "Oil below 8 psi"),
        (0x0100, true, "Low Coolant"),
        fuel_bit,
    ];
    digital_values(v, &table)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Utility,
    Generator,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Utility => "Utility",
            Self::Generator => "Generator",
        })
    }
}

/// Transfer switch position, Evolution liquid cooled only.
pub fn transfer_state(view: &impl RegisterView, id: Identity) -> Option<TransferState> {
    if !id.is_evo_lc() {
        return None;
    }
    let v = reg_u16(view, 0x0053)?;
    Some(if v & 0x01 == 0x01 {
        TransferState::Generator
    } else {
        TransferState::Utility
    })
}

fn volts_text(view: &impl RegisterView, address: u16) -> String {
    reg_u16(view, address).map_or_else(String::new, |v| format!("{v}V"))
}

pub fn utility_voltage_text(view: &impl RegisterView) -> String {
    volts_text(view, 0x0009)
}

pub fn output_voltage_text(view: &impl RegisterView) -> String {
    volts_text(view, 0x0012)
}

pub fn threshold_voltage_text(view: &impl RegisterView) -> String {
    volts_text(view, 0x0011)
}

pub fn pickup_voltage_text(view: &impl RegisterView) -> String {
    volts_text(view, 0x023b)
}

pub fn set_output_voltage_text(view: &impl RegisterView, id: Identity) -> String {
    if !id.is_evo_lc() {
        return String::new();
    }
    volts_text(view, 0x0237)
}

pub fn startup_delay_text(view: &impl RegisterView, id: Identity) -> String {
    let register = match (id.evolution, id.liquid_cooled) {
        (true, false) => 0x002b,
        (true, true) => 0x0239,
        (false, _) => return String::new(),
    };
    reg_u16(view, register).map_or_else(String::new, |v| format!("{v} s"))
}

pub fn rpm(view: &impl RegisterView) -> Option<u16> {
    reg_u16(view, 0x0007)
}

pub fn rpm_text(view: &impl RegisterView) -> String {
    rpm(view).map_or_else(String::new, |v| format!("{v:5}"))
}

/// Output frequency in Hz. Evolution liquid cooled reports tenths; Nexus
/// liquid cooled reports half the value.
pub fn frequency(view: &impl RegisterView, id: Identity) -> Option<f64> {
    let raw = f64::from(reg_u16(view, 0x0008)?);
    Some(if id.is_evo_lc() {
        raw / 10.0
    } else if id.is_nexus_lc() {
        raw * 2.0
    } else {
        raw
    })
}

pub fn frequency_text(view: &impl RegisterView, id: Identity) -> String {
    frequency(view, id).map_or_else(String::new, |f| format!("{f:.1} Hz"))
}

pub fn battery_voltage_text(view: &impl RegisterView) -> String {
    reg_u16(view, 0x000a).map_or_else(String::new, |v| format!("{:.1}V", f64::from(v) / 10.0))
}

/// Charger relay state on Evolution liquid cooled units.
pub fn battery_status(view: &impl RegisterView, id: Identity) -> String {
    if !id.is_evo_lc() {
        return "Not Available".to_string();
    }
    match reg_u16(view, 0x0053) {
        Some(v) if v & 0x10 == 0x10 => "Charging".to_string(),
        Some(_) => "Not Charging".to_string(),
        None => String::new(),
    }
}

/// Charging estimate from the charger current sensor (05ee).
pub fn battery_status_from_sensor(view: &impl RegisterView, id: Identity) -> String {
    if !id.evolution {
        return "Not Available".to_string();
    }
    if !engine_idle(view) || engine_state(view).is_none() {
        return "Not Charging".to_string();
    }
    let Some(raw) = reg_u16(view, 0x05ee) else {
        return String::new();
    };
    let amps = f64::from(raw) / 10.0;
    let floor = if id.liquid_cooled { 5.0 } else { 0.0 };
    if amps > floor {
        "Charging".to_string()
    } else {
        "Not Charging".to_string()
    }
}

/// Output current in amps; 0 while stopped and on Nexus.
pub fn current(view: &impl RegisterView, id: Identity) -> f64 {
    if !id.evolution || engine_idle(view) {
        return 0.0;
    }
    if id.liquid_cooled {
        reg_u16(view, 0x0058)
            .map_or(0.0, |v| (f64::from(v) * 0.2248 - 303.268).max(0.0))
    } else {
        let e1 = reg_u16(view, 0x05f4).unwrap_or(0);
        let e2 = reg_u16(view, 0x05f5).unwrap_or(0);
        f64::from(e1) + f64::from(e2)
    }
}

pub fn current_text(view: &impl RegisterView, id: Identity) -> String {
    format!("{:.2}A", current(view, id))
}

/// Single-phase output power in kW. `None` on Nexus.
pub fn power_kw(view: &impl RegisterView, id: Identity) -> Option<f64> {
    if !id.evolution {
        return None;
    }
    if engine_idle(view) {
        return Some(0.0);
    }
    let volts = f64::from(reg_u16(view, 0x0012)?);
    Some(volts * current(view, id) / 1000.0)
}

pub fn power_text(view: &impl RegisterView, id: Identity) -> String {
    if !id.evolution {
        return String::new();
    }
    if engine_idle(view) {
        return "0kW".to_string();
    }
    format!("{:.2}kW", power_kw(view, id).unwrap_or(0.0))
}

/// Rotor poles implied by frequency and RPM; 0 when implausible.
pub fn rotor_poles(view: &impl RegisterView, id: Identity) -> Option<u32> {
    if !id.evolution {
        return None;
    }
    let (Some(hz), Some(rpm)) = (frequency(view, id), rpm(view)) else {
        return Some(0);
    };
    if rpm == 0 {
        return Some(0);
    }
    // frequency is shown to one decimal, poles are computed from that
    let hz = (hz * 10.0).round() / 10.0;
    let poles = (120.0 * hz / f64::from(rpm)).round();
    Some(if poles > 4.0 || poles < 0.0 { 0 } else { poles as u32 })
}

pub fn rotor_poles_text(view: &impl RegisterView, id: Identity) -> String {
    text(rotor_poles(view, id))
}

/// Total run hours. Evolution liquid cooled counts minutes in 005e:005f.
pub fn run_hours_text(view: &impl RegisterView, id: Identity) -> String {
    if id.is_evo_lc() {
        let (Some(hi), Some(lo)) = (reg_u16(view, 0x005e), reg_u16(view, 0x005f)) else {
            return String::new();
        };
        let minutes = (u32::from(hi) << 16) | u32::from(lo);
        format!("{:.2} ", f64::from(minutes) / 60.0)
    } else {
        let (Some(hi), Some(lo)) = (reg_u16(view, 0x000b), reg_u16(view, 0x000c)) else {
            return String::new();
        };
        format!("{} ", (u32::from(hi) << 16) | u32::from(lo))
    }
}

pub fn hardware_version(view: &impl RegisterView) -> String {
    reg_u16(view, 0x002a).map_or_else(String::new, |v| format!("V{:.2}", f64::from(v >> 8) / 100.0))
}

pub fn firmware_version(view: &impl RegisterView) -> String {
    reg_u16(view, 0x002a)
        .map_or_else(String::new, |v| format!("V{:.2}", f64::from(v & 0xff) / 100.0))
}

/// Serial number from the low nibble of each byte of the model register.
pub fn serial_number(view: &impl RegisterView) -> String {
    let Some(v) = view.value(MODEL_REG) else {
        return String::new();
    };
    if v.len() != 20 {
        return String::new();
    }
    if v.starts_with("ff") {
        return "None - Controller has been replaced".to_string();
    }
    let serial = v
        .chars()
        .rev()
        .step_by(2)
        .filter_map(|c| c.to_digit(16))
        .enumerate()
        .fold(0u64, |acc, (k, nibble)| acc | (u64::from(nibble) << (4 * k)));
    format!("{serial:010x}")
}

const DAYS_OF_WEEK: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn day_name(dow: u16) -> &'static str {
    DAYS_OF_WEEK.get(usize::from(dow)).copied().unwrap_or("INVALID")
}

/// Controller clock fields, validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorClock {
    pub hour: u16,
    pub minute: u16,
    pub month: u16,
    pub day: u16,
    pub day_of_week: u16,
    pub year: u16,
}

impl GeneratorClock {
    pub fn to_datetime(self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(
            2000 + i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )?
        .and_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
    }
}

pub fn generator_clock(view: &impl RegisterView) -> Option<GeneratorClock> {
    let time = reg_u16(view, 0x000e)?;
    let (hour, minute) = (time >> 8, time & 0xff);
    if hour > 23 || minute >= 60 {
        return None;
    }
    let date = reg_u16(view, 0x000f)?;
    let (month, day) = (date >> 8, date & 0xff);
    if month == 0 || month > 12 || day == 0 || day > 31 {
        return None;
    }
    let misc = reg_u16(view, 0x0010)?;
    let (day_of_week, year) = (misc >> 8, misc & 0xff);
    if day_of_week > 7 || year < 16 {
        return None;
    }
    Some(GeneratorClock {
        hour,
        minute,
        month,
        day,
        day_of_week,
        year,
    })
}

/// e.g. `Wednesday October 17, 2024 12:00`
pub fn generator_time_text(view: &impl RegisterView) -> String {
    let Some(c) = generator_clock(view) else {
        return String::new();
    };
    let month = MONTHS
        .get(usize::from(c.month) - 1)
        .copied()
        .unwrap_or("INVALID");
    format!(
        "{} {} {}, 20{} {:02}:{:02}",
        day_name(c.day_of_week),
        month,
        c.day,
        c.year,
        c.hour,
        c.minute
    )
}

/// Exercise schedule, e.g. `Weekly Saturday 13:30 Quiet Mode On`.
///
/// With `enhanced` the frequency register 002d selects weekly, biweekly or
/// monthly; monthly takes the day of month from 002e.
pub fn exercise_time_text(view: &impl RegisterView, enhanced: bool) -> String {
    let freq = if enhanced {
        let Some(v) = reg_u16(view, 0x002d) else {
            return String::new();
        };
        let f = v & 0xff;
        if f > 2 {
            return String::new();
        }
        f
    } else {
        0
    };

    let Some(time) = reg_u16(view, 0x0005) else {
        return String::new();
    };
    let (hour, minute) = (time >> 8, time & 0xff);
    if hour > 23 || minute >= 60 {
        return String::new();
    }
    let Some(day_reg) = reg_u16(view, 0x0006) else {
        return String::new();
    };

    let day = if freq == 2 {
        let Some(alt) = reg_u16(view, 0x002e) else {
            return String::new();
        };
        let dom = alt & 0xff;
        if dom > 28 {
            return String::new();
        }
        format!("Day-{dom}")
    } else {
        let dow = day_reg >> 8;
        if dow > 7 {
            return String::new();
        }
        DAYS_OF_WEEK.get(usize::from(dow)).copied().unwrap_or("").to_string()
    };

    let freq_name = match freq {
        0 => "Weekly",
        1 => "Biweekly",
        _ => "Monthly",
    };
    let quiet = match day_reg & 0xff {
        0 => "Off",
        1 => "On",
        _ => "Unknown",
    };
    format!("{freq_name} {day} {hour:02}:{minute:02} Quiet Mode {quiet}")
}

/// Compact exercise form for the web UI: `day!HH!MM!quiet!freq!enhanced`.
pub fn parsed_exercise_time(view: &impl RegisterView, enhanced: bool) -> String {
    let full = exercise_time_text(view, enhanced);
    let items: Vec<&str> = full.split(' ').collect();
    if items.len() < 6 {
        return String::new();
    }
    let Some((hh, mm)) = items[2].split_once(':') else {
        return String::new();
    };
    let day = if full.to_lowercase().contains("monthly") {
        let digits: String = items[1].chars().filter(char::is_ascii_digit).collect();
        format!("{:02}", digits.parse::<u32>().unwrap_or(0))
    } else {
        items[1].to_string()
    };
    let mode = if enhanced { "True" } else { "False" };
    format!("{day}!{hh}!{mm}!{}!{}!{mode}", items[5], items[0])
}

/// Exercise length, Evolution liquid cooled only.
pub fn exercise_duration_text(view: &impl RegisterView, id: Identity) -> String {
    if !id.is_evo_lc() {
        return String::new();
    }
    reg_u16(view, 0x023e).map_or_else(String::new, |v| format!("{v} min"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceItem {
    A,
    B,
    Oil,
    Air,
    Spark,
    Battery,
    Other,
}

impl ServiceItem {
    /// Items a controller tracks, in the order reports list them.
    pub fn for_identity(id: Identity) -> &'static [Self] {
        if id.evolution {
            &[Self::A, Self::B]
        } else if id.liquid_cooled {
            &[Self::Air, Self::Oil, Self::Spark]
        } else {
            &[Self::Air, Self::Oil, Self::Spark, Self::Battery, Self::Other]
        }
    }

    /// Hours-until-due register.
    pub fn due_register(self, id: Identity) -> Option<u16> {
        match (id.evolution, id.liquid_cooled, self) {
            (true, _, Self::A) => Some(0x001a),
            (true, _, Self::B) => Some(0x001e),
            (false, false, Self::Spark) => Some(0x001a),
            (false, false, Self::Oil) => Some(0x001e),
            (false, false, Self::Air) => Some(0x001c),
            (false, false, Self::Battery) => Some(0x001f),
            (false, false, Self::Other) => Some(0x0021),
            (false, true, Self::Oil) => Some(0x001a),
            (false, true, Self::Spark) => Some(0x001e),
            (false, true, Self::Air) => Some(0x001c),
            _ => None,
        }
    }

    /// Due-date register (days since the epoch).
    pub fn date_register(self, id: Identity) -> Option<u16> {
        match (id.evolution, id.liquid_cooled, self) {
            (true, _, Self::A) => Some(0x001b),
            (true, _, Self::B) => Some(0x001f),
            (false, false, Self::Spark) => Some(0x001b),
            (false, false, Self::Oil) => Some(0x0020),
            (false, false, Self::Battery) => Some(0x001d),
            (false, false, Self::Air) => Some(0x0022),
            (false, true, Self::Oil) => Some(0x001b),
            (false, true, Self::Spark) => Some(0x001f),
            (false, true, Self::Air) => Some(0x001d),
            _ => None,
        }
    }
}

pub fn service_due_hours(view: &impl RegisterView, id: Identity, item: ServiceItem) -> Option<u16> {
    reg_u16(view, item.due_register(id)?)
}

pub fn service_due_text(view: &impl RegisterView, id: Identity, item: ServiceItem) -> String {
    service_due_hours(view, id, item).map_or_else(String::new, |h| format!("{h} hrs"))
}

/// Due date rendered `%m/%d/%Y ` (UTC).
pub fn service_due_date(view: &impl RegisterView, id: Identity, item: ServiceItem) -> String {
    let Some(days) = item.date_register(id).and_then(|r| reg_u16(view, r)) else {
        return String::new();
    };
    let secs = i64::from(days) * 86_400 + 86_400;
    DateTime::from_timestamp(secs, 0)
        .map(|d| d.format("%m/%d/%Y ").to_string())
        .unwrap_or_default()
}

pub fn service_is_due(view: &impl RegisterView, id: Identity) -> bool {
    let Some(status) = status_u32(view) else {
        return false;
    };
    if status & 0xfff0_ffff == 0x1f {
        return true;
    }
    ServiceItem::for_identity(id)
        .iter()
        .filter_map(|item| service_due_hours(view, id, *item))
        .any(|h| h <= 1)
}

/// Single-word summary used by the web UI to pick a colour.
pub fn base_status(view: &impl RegisterView, id: Identity) -> &'static str {
    if in_alarm(view) {
        return "ALARM";
    }
    if service_is_due(view, id) {
        return "SERVICEDUE";
    }
    let engine = engine_text(view).to_lowercase();
    let switch = switch_text(view).to_lowercase();
    if engine.contains("exercising") {
        "EXERCISING"
    } else if engine.contains("running") {
        if switch.contains("auto") {
            "RUNNING"
        } else {
            "RUNNING-MANUAL"
        }
    } else if switch.contains("off") {
        "OFF"
    } else if switch.contains("manual") {
        "MANUAL"
    } else {
        "READY"
    }
}

/// Decimal reading of an unsupported sensor. With `requires_running`,
/// reports "0" unless the engine is running.
pub fn unknown_sensor(view: &impl RegisterView, address: u16, requires_running: bool) -> Option<String> {
    if requires_running && engine_idle(view) {
        return Some("0".to_string());
    }
    reg_u16(view, address).map(|v| v.to_string())
}

/// Ambient temperature from the thermistor reading; readings under 10 are
/// below the sensor's range.
pub fn ambient_temperature(raw: u16) -> Option<(f64, f64)> {
    if raw < 10 {
        return None;
    }
    let celsius = 88.0 - ((f64::from(raw) - 10.0) * 125.0).sqrt();
    Some((celsius, 9.0 / 5.0 * celsius + 32.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::BTreeMap;

    const EVO_AC: Identity = Identity::new(true, false);
    const EVO_LC: Identity = Identity::new(true, true);
    const NEXUS_AC: Identity = Identity::new(false, false);

    fn view(pairs: &[(u16, &str)]) -> BTreeMap<u16, String> {
        pairs.iter().map(|(a, v)| (*a, (*v).to_string())).collect()
    }

    #[rstest]
    #[case(0x0000_0000, "Off - Ready")]
    #[case(0x0001_0000, "Startup Delay Timer Activated")]
    #[case(0x0002_0000, "Cranking")]
    #[case(0x0002_0001, "Cranking in Alarm")]
    #[case(0x0003_0000, "Running")]
    #[case(0x0003_0031, "Running in Alarm")]
    #[case(0x0004_0000, "Exercising")]
    #[case(0x0005_0000, "Cooling Down")]
    #[case(0x0006_0000, "Running in Warning")]
    #[case(0x0008_0000, "Stopped in Alarm")]
    #[case(0x0009_0000, "Stopped")]
    #[case(0x000a_0000, "UNKNOWN: 000a0000")]
    fn engine_states(#[case] status: u32, #[case] want: &str) {
        assert_eq!(EngineState::from_status(status).to_string(), want);
    }

    #[rstest]
    #[case(0x00, "Auto")]
    #[case(0x07, "Off")]
    #[case(0x06, "Manual")]
    #[case(0x17, "Two Wire Stop")]
    #[case(0x31, "System in Alarm")]
    fn switch_states(#[case] low: u32, #[case] want: &str) {
        assert_eq!(SwitchState::from_status(0x0003_0000 | low).to_string(), want);
    }

    #[test]
    fn alarm_needs_alarm_switch() {
        let cat = AlarmCatalog::default();
        assert_eq!(alarm_state(&view(&[(1, "00030000")]), EVO_AC, &cat), None);
        let v = view(&[(1, "00080031")]);
        assert_eq!(
            alarm_state(&v, NEXUS_AC, &cat).map(|a| a.to_string()),
            Some("Low Fuel Level".to_string())
        );
        let v = view(&[(1, "00080099")]);
        assert_eq!(
            alarm_state(&v, NEXUS_AC, &cat),
            Some(AlarmState::Unknown(0x0008_0099))
        );
    }

    #[test]
    fn alarm_prefers_catalog_name_on_evolution() {
        let cat = AlarmCatalog::from_reader("1400!W!Low Battery Warning!Battery low!Charge it\n".as_bytes())
            .unwrap();
        let v = view(&[(1, "00080031"), (0x05f1, "0578")]);
        assert_eq!(
            alarm_state(&v, EVO_AC, &cat),
            Some(AlarmState::Catalog("Low Battery Warning".to_string()))
        );
        assert_eq!(
            alarm_info(&cat, EVO_AC, "0578", false),
            "Low Battery Warning, Error Code: 1400\n    Description: Battery low\n    Additional Info: Charge it\n"
        );
        assert_eq!(alarm_info(&cat, EVO_AC, "0001", false), "Error Code Unknown: 0001\n");
        assert_eq!(alarm_info(&cat, EVO_AC, "0000", true), "Warning Code Unknown: 0");
        assert_eq!(alarm_info(&cat, NEXUS_AC, "0578", true), "");
    }

    #[test]
    fn relays_and_sensors() {
        let v = view(&[(0x0053, "0011"), (0x0052, "0041")]);
        assert_eq!(digital_outputs(&v, EVO_LC), "Transfer Switch Activated, Battery Charger On");
        assert_eq!(digital_outputs(&v, EVO_AC), "");
        assert_eq!(sensor_inputs(&v, EVO_LC, "Diesel"), "Manual Button");
        assert_eq!(
            sensor_inputs(&v, EVO_LC, "Natural Gas"),
            "Manual Button, Fuel below 5 inch"
        );
        assert_eq!(transfer_state(&v, EVO_LC), Some(TransferState::Generator));
        assert_eq!(battery_status(&v, EVO_LC), "Charging");
        assert_eq!(battery_status(&v, EVO_AC), "Not Available");
    }

    #[test]
    fn estop_shows_when_bit_clear() {
        let v = view(&[(0x0052, "0200")]);
        assert_eq!(sensor_inputs(&v, EVO_LC, "Diesel"), "E-Stop Activated, Fuel Pressure / Level Low");
    }

    #[test]
    fn frequency_scaling_per_family() {
        let v = view(&[(0x0008, "0258")]);
        assert_eq!(frequency_text(&v, EVO_LC), "60.0 Hz");
        let v = view(&[(0x0008, "001e")]);
        assert_eq!(frequency_text(&v, Identity::new(false, true)), "60.0 Hz");
        assert_eq!(frequency_text(&v, EVO_AC), "30.0 Hz");
    }

    #[test]
    fn current_and_power_while_running() {
        let v = view(&[
            (1, "00030000"),
            (0x0012, "00f0"),
            (0x05f4, "000a"),
            (0x05f5, "0005"),
        ]);
        assert_eq!(current_text(&v, EVO_AC), "15.00A");
        assert_eq!(power_text(&v, EVO_AC), "3.60kW");
        let v = view(&[(1, "00030000"), (0x0012, "00f0"), (0x0058, "0200")]);
        assert_eq!(current_text(&v, EVO_LC), "0.00A");
        let v = view(&[(1, "00030000"), (0x0058, "0600")]);
        assert_eq!(current_text(&v, EVO_LC), "42.02A");
    }

    #[test]
    fn stopped_engine_reports_no_output() {
        let v = view(&[(1, "00000000"), (0x0012, "00f0"), (0x05f4, "000a")]);
        assert_eq!(current_text(&v, EVO_AC), "0.00A");
        assert_eq!(power_text(&v, EVO_AC), "0kW");
        assert_eq!(power_text(&v, NEXUS_AC), "");
    }

    #[test]
    fn rotor_poles_from_frequency_and_rpm() {
        let v = view(&[(0x0008, "003c"), (0x0007, "0e10")]);
        assert_eq!(rotor_poles(&v, EVO_AC), Some(2));
        let v = view(&[(0x0008, "003c"), (0x0007, "0064")]);
        assert_eq!(rotor_poles(&v, EVO_AC), Some(0));
        assert_eq!(rotor_poles(&v, NEXUS_AC), None);
    }

    #[test]
    fn serial_number_nibbles() {
        let v = view(&[(MODEL_REG, "30303037373232393837")]);
        assert_eq!(serial_number(&v), "0007722987");
        let v = view(&[(MODEL_REG, "ff303037373232393837")]);
        assert_eq!(serial_number(&v), "None - Controller has been replaced");
    }

    #[test]
    fn generator_time_and_exercise() {
        let v = view(&[
            (0x000e, "0c00"),
            (0x000f, "0a11"),
            (0x0010, "0318"),
            (0x0005, "0d1e"),
            (0x0006, "0601"),
        ]);
        assert_eq!(generator_time_text(&v), "Wednesday October 17, 2024 12:00");
        assert_eq!(exercise_time_text(&v, false), "Weekly Saturday 13:30 Quiet Mode On");
        assert_eq!(parsed_exercise_time(&v, false), "Saturday!13!30!On!Weekly!False");
    }

    #[test]
    fn monthly_exercise_uses_day_of_month() {
        let v = view(&[
            (0x002d, "0002"),
            (0x002e, "000f"),
            (0x0005, "0700"),
            (0x0006, "0000"),
        ]);
        assert_eq!(exercise_time_text(&v, true), "Monthly Day-15 07:00 Quiet Mode Off");
        assert_eq!(parsed_exercise_time(&v, true), "15!07!00!Off!Monthly!True");
    }

    #[test]
    fn invalid_clock_is_blank() {
        let v = view(&[(0x000e, "1800"), (0x000f, "0a11"), (0x0010, "0318")]);
        assert_eq!(generator_time_text(&v), "");
    }

    #[test]
    fn service_and_base_status() {
        let v = view(&[(1, "00000000"), (0x001a, "00bc"), (0x001e, "0184"), (0x001b, "4fb0")]);
        assert!(!service_is_due(&v, EVO_AC));
        assert_eq!(base_status(&v, EVO_AC), "READY");
        assert_eq!(service_due_text(&v, EVO_AC, ServiceItem::A), "188 hrs");
        assert_eq!(service_due_date(&v, EVO_AC, ServiceItem::A), "11/09/2025 ");

        let v = view(&[(1, "00000000"), (0x001a, "0001")]);
        assert_eq!(base_status(&v, EVO_AC), "SERVICEDUE");
        let v = view(&[(1, "00030006")]);
        assert_eq!(base_status(&v, EVO_AC), "RUNNING-MANUAL");
        let v = view(&[(1, "00000007")]);
        assert_eq!(base_status(&v, EVO_AC), "OFF");
        let v = view(&[(1, "00080031")]);
        assert_eq!(base_status(&v, EVO_AC), "ALARM");
    }

    #[test]
    fn run_hours_and_versions() {
        let v = view(&[(0x000b, "0000"), (0x000c, "0070"), (0x002a, "0f19")]);
        assert_eq!(run_hours_text(&v, EVO_AC), "112 ");
        assert_eq!(hardware_version(&v), "V0.15");
        assert_eq!(firmware_version(&v), "V0.25");
        let v = view(&[(0x005e, "0000"), (0x005f, "1a40")]);
        assert_eq!(run_hours_text(&v, EVO_LC), "112.00 ");
    }

    #[test]
    fn thermistor_conversion() {
        assert_eq!(ambient_temperature(9), None);
        let (c, f) = ambient_temperature(10).unwrap();
        assert!((c - 88.0).abs() < 1e-9);
        assert!((f - 190.4).abs() < 1e-9);
    }
}
