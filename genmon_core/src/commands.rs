//! Text command protocol and the controller write encodings.
//!
//! Commands look like `generator: status maint` or
//! `generator: setexercise=Monday,13:30,Weekly`. Everything here is parsing
//! and encoding only; the orchestrator performs the writes.

use crate::registers::{
    CLOCK_REG, COMMAND_INDEX_REG, COMMAND_VALUE_REG, EXERCISE_DAY_REG, EXERCISE_FREQ_REG,
    EXERCISE_TIME_REG, QUIET_MODE_REG,
};
use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike};

pub const PREFIX: &str = "generator:";
pub const END_OF_MESSAGE: &str = "EndOfMessage";

pub const ZERO_LENGTH_REPLY: &str =
    "Invalid GENERATOR command: zero length command. All commands must be prefixed by \"generator: \"";
pub const MISSING_PREFIX_REPLY: &str =
    "Invalid GENERATOR command: all commands must be prefixed by \"generator: \"";

pub const SETREMOTE_SYNTAX: &str = "Invalid command syntax for command setremote (1)";
pub const SETREMOTE_UNKNOWN: &str = "Invalid command syntax for command setremote (2)";
pub const SETQUIET_SYNTAX: &str = "Invalid command syntax for command setquiet";
pub const SETEXERCISE_SYNTAX: &str = "Invalid command syntax for command setexercise";
pub const GETREGVALUE_SYNTAX: &str = "Invalid command syntax for command getregvalue";
pub const READREGVALUE_SYNTAX: &str = "Invalid command syntax for command readregvalue";

pub const REMOTE_SENT: &str = "Remote command sent successfully";
pub const QUIET_SENT: &str = "Set Quiet Mode Command sent";
pub const EXERCISE_SENT: &str = "Set Exercise Time Command sent";
pub const EXERCISE_LEGACY_SENT: &str = "Set Exercise Time Command sent (using legacy write)";
pub const TIME_SET_SENT: &str = "Time Set: Command Sent\n";

/// Why a command line was refused before any item was looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    ZeroLength,
    MissingPrefix,
}

impl Rejection {
    pub fn subject(self) -> &'static str {
        match self {
            Self::ZeroLength => "Error in Generator Command (Lenght is zero)",
            Self::MissingPrefix => "Error in Generator Command (no generator: prefix)",
        }
    }

    pub fn reply(self) -> &'static str {
        match self {
            Self::ZeroLength => ZERO_LENGTH_REPLY,
            Self::MissingPrefix => MISSING_PREFIX_REPLY,
        }
    }
}

/// Strip the prefix and split into lowercase, space-separated items.
pub fn split_items(command: &str) -> Result<Vec<String>, Rejection> {
    if command.is_empty() {
        return Err(Rejection::ZeroLength);
    }
    let lower = command.to_lowercase();
    let Some(rest) = lower.strip_prefix(PREFIX) else {
        return Err(Rejection::MissingPrefix);
    };
    Ok(rest
        .split(' ')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != PREFIX)
        .map(str::to_string)
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Registers,
    AllRegs,
    Logs,
    Status,
    Maint,
    Monitor,
    Outage,
    SetTime,
    SetExercise,
    SetQuiet,
    Help,
    SetRemote,
    PowerLogJson,
    PowerLogClear,
    StartInfoJson,
    RegistersJson,
    AllRegsJson,
    LogsJson,
    StatusJson,
    MaintJson,
    MonitorJson,
    OutageJson,
    GuiStatusJson,
    GetSiteName,
    GetBase,
    GetHealth,
    GetExercise,
    GetRegValue,
    ReadRegValue,
    GetDebug,
    Reload,
}

enum Match {
    Exact(&'static str),
    Contains(&'static str),
}

/// Lookup order matters: substring verbs must not shadow exact ones.
const GENERAL: &[(Match, Verb)] = &[
    (Match::Exact("registers"), Verb::Registers),
    (Match::Exact("allregs"), Verb::AllRegs),
    (Match::Exact("logs"), Verb::Logs),
    (Match::Exact("status"), Verb::Status),
    (Match::Exact("maint"), Verb::Maint),
    (Match::Exact("monitor"), Verb::Monitor),
    (Match::Exact("outage"), Verb::Outage),
    (Match::Exact("settime"), Verb::SetTime),
    (Match::Contains("setexercise"), Verb::SetExercise),
    (Match::Contains("setquiet"), Verb::SetQuiet),
    (Match::Exact("help"), Verb::Help),
    (Match::Contains("setremote"), Verb::SetRemote),
];

const SOCKET_ONLY: &[(Match, Verb)] = &[
    (Match::Contains("power_log_json"), Verb::PowerLogJson),
    (Match::Exact("power_log_clear"), Verb::PowerLogClear),
    (Match::Exact("start_info_json"), Verb::StartInfoJson),
    (Match::Exact("registers_json"), Verb::RegistersJson),
    (Match::Exact("allregs_json"), Verb::AllRegsJson),
    (Match::Exact("logs_json"), Verb::LogsJson),
    (Match::Exact("status_json"), Verb::StatusJson),
    (Match::Exact("maint_json"), Verb::MaintJson),
    (Match::Exact("monitor_json"), Verb::MonitorJson),
    (Match::Exact("outage_json"), Verb::OutageJson),
    (Match::Exact("gui_status_json"), Verb::GuiStatusJson),
    (Match::Exact("getsitename"), Verb::GetSiteName),
    (Match::Exact("getbase"), Verb::GetBase),
    (Match::Exact("gethealth"), Verb::GetHealth),
    (Match::Exact("getexercise"), Verb::GetExercise),
    (Match::Contains("getregvalue"), Verb::GetRegValue),
    (Match::Contains("readregvalue"), Verb::ReadRegValue),
    (Match::Exact("getdebug"), Verb::GetDebug),
    (Match::Exact("reload"), Verb::Reload),
];

fn lookup(table: &[(Match, Verb)], item: &str) -> Option<Verb> {
    table.iter().find_map(|(m, v)| {
        let hit = match m {
            Match::Exact(s) => item == *s,
            Match::Contains(s) => item.contains(s),
        };
        hit.then_some(*v)
    })
}

/// What an item means on a given channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Verb(Verb),
    /// A socket-only verb received on another channel.
    WrongChannel,
    Unknown,
}

pub fn resolve(item: &str, from_socket: bool) -> Resolved {
    if let Some(v) = lookup(GENERAL, item) {
        return Resolved::Verb(v);
    }
    match lookup(SOCKET_ONLY, item) {
        Some(v) if from_socket => Resolved::Verb(v),
        Some(_) => Resolved::WrongChannel,
        None => Resolved::Unknown,
    }
}

pub fn invalid_item_reply(item: &str) -> String {
    format!("Invalid GENERATOR command: {item}\n")
}

impl Verb {
    /// JSON report verbs whose output replaces the whole reply body.
    pub fn replaces_body(self) -> bool {
        matches!(
            self,
            Self::RegistersJson
                | Self::AllRegsJson
                | Self::LogsJson
                | Self::StatusJson
                | Self::MaintJson
                | Self::MonitorJson
                | Self::OutageJson
        )
    }
}

/// `name=value` with `name` checked case-insensitively.
fn assignment<'a>(item: &'a str, name: &str) -> Option<&'a str> {
    let mut parts = item.split('=');
    let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Stop,
    Start,
    StartTransfer,
    StartExercise,
}

impl RemoteCommand {
    /// Value written to the command index register.
    pub fn index(self) -> u8 {
        match self {
            Self::Stop => 0,
            Self::Start => 1,
            Self::StartTransfer => 2,
            Self::StartExercise => 3,
        }
    }
}

pub fn parse_setremote(item: &str) -> Result<RemoteCommand, &'static str> {
    let value = assignment(item, "setremote").ok_or(SETREMOTE_SYNTAX)?;
    match value {
        "start" => Ok(RemoteCommand::Start),
        "stop" => Ok(RemoteCommand::Stop),
        "starttransfer" => Ok(RemoteCommand::StartTransfer),
        "startexercise" => Ok(RemoteCommand::StartExercise),
        _ => Err(SETREMOTE_UNKNOWN),
    }
}

/// `true` for quiet mode on.
pub fn parse_setquiet(item: &str) -> Result<bool, &'static str> {
    let value = assignment(item, "setquiet").ok_or(SETQUIET_SYNTAX)?;
    let value = value.to_lowercase();
    if value.contains("on") {
        Ok(true)
    } else if value.contains("off") {
        Ok(false)
    } else {
        Err(SETQUIET_SYNTAX)
    }
}

/// Register name from `getregvalue=<reg>` / `readregvalue=<reg>`.
pub fn parse_reg_query<'a>(item: &'a str, verb: Verb) -> Result<&'a str, &'static str> {
    let (name, err) = match verb {
        Verb::ReadRegValue => ("readregvalue", READREGVALUE_SYNTAX),
        _ => ("getregvalue", GETREGVALUE_SYNTAX),
    };
    assignment(item, name).ok_or(err)
}

pub fn unsupported_register(reg: &str) -> String {
    format!("Unsupported Register: {reg}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseMode {
    Weekly,
    Biweekly,
    Monthly,
}

impl ExerciseMode {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "weekly" => Some(Self::Weekly),
            "biweekly" => Some(Self::Biweekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn register_value(self) -> u8 {
        match self {
            Self::Weekly => 0,
            Self::Biweekly => 1,
            Self::Monthly => 2,
        }
    }
}

/// Day numbering used by the target encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekStart {
    /// Controller registers: Sunday = 0.
    Sunday,
    /// Legacy delta encoding: Monday = 0.
    Monday,
}

const DAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

fn day_number(name: &str, start: WeekStart) -> Option<u8> {
    let sunday_based = DAY_NAMES.iter().position(|d| *d == name.to_lowercase())?;
    let n = match start {
        WeekStart::Sunday => sunday_based,
        WeekStart::Monday => (sunday_based + 6) % 7,
    };
    u8::try_from(n).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExerciseRequest {
    /// Weekday (per [`WeekStart`]) or day of month for monthly.
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub mode: ExerciseMode,
}

/// Parse `setexercise=<day>,<HH:MM>[,weekly|biweekly|monthly]`.
pub fn parse_setexercise(item: &str, start: WeekStart) -> Result<ExerciseRequest, &'static str> {
    if !item.to_lowercase().contains("setexercise") {
        return Err(SETEXERCISE_SYNTAX);
    }
    let parts: Vec<&str> = item.split('=').collect();
    let [_, args] = parts.as_slice() else {
        return Err(SETEXERCISE_SYNTAX);
    };
    let fields: Vec<&str> = args.split(',').map(str::trim).collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(SETEXERCISE_SYNTAX);
    }
    let mode = match fields.get(2) {
        Some(m) => ExerciseMode::parse(m).ok_or(SETEXERCISE_SYNTAX)?,
        None => ExerciseMode::Weekly,
    };
    let Some((h, m)) = fields[1].split_once(':') else {
        return Err(SETEXERCISE_SYNTAX);
    };
    let hour: u8 = h.trim().parse().map_err(|_| SETEXERCISE_SYNTAX)?;
    let minute: u8 = m.trim().parse().map_err(|_| SETEXERCISE_SYNTAX)?;
    let day = if mode == ExerciseMode::Monthly {
        fields[0].parse::<u8>().map_err(|_| SETEXERCISE_SYNTAX)?
    } else {
        day_number(fields[0], start).ok_or(SETEXERCISE_SYNTAX)?
    };

    let day_ok = match mode {
        ExerciseMode::Monthly => (1..=28).contains(&day),
        _ => day <= 6,
    };
    if minute > 59 || hour > 23 || !day_ok {
        tracing::warn!(item, "setexercise value out of range");
        return Err(SETEXERCISE_SYNTAX);
    }
    Ok(ExerciseRequest {
        day,
        hour,
        minute,
        mode,
    })
}

/// One register write: `data` holds two bytes per word, high byte first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: u16,
    pub data: Vec<u8>,
}

impl RegisterWrite {
    pub fn word(address: u16, hi: u8, lo: u8) -> Self {
        Self {
            address,
            data: vec![hi, lo],
        }
    }

    pub fn words(&self) -> u16 {
        u16::try_from(self.data.len() / 2).unwrap_or(u16::MAX)
    }
}

/// Indexed command: value into 0004, then the index into 0003.
fn indexed(value: u16, index: u8) -> Vec<RegisterWrite> {
    let [hi, lo] = value.to_be_bytes();
    vec![
        RegisterWrite::word(COMMAND_VALUE_REG, hi, lo),
        RegisterWrite::word(COMMAND_INDEX_REG, 0, index),
    ]
}

pub fn remote_writes(cmd: RemoteCommand) -> Vec<RegisterWrite> {
    indexed(0, cmd.index())
}

pub fn quiet_writes(on: bool) -> Vec<RegisterWrite> {
    vec![RegisterWrite::word(QUIET_MODE_REG, 0, u8::from(on))]
}

/// Direct exercise registers: frequency (enhanced only), day, then time.
pub fn exercise_writes(req: ExerciseRequest, enhanced: bool) -> Result<Vec<RegisterWrite>, &'static str> {
    if !enhanced && req.mode != ExerciseMode::Weekly {
        tracing::warn!(mode = ?req.mode, "biweekly and monthly exercise need enhanced frequency");
        return Err(SETEXERCISE_SYNTAX);
    }
    let mut writes = Vec::with_capacity(3);
    if enhanced {
        writes.push(RegisterWrite::word(EXERCISE_FREQ_REG, 0, req.mode.register_value()));
    }
    writes.push(RegisterWrite::word(EXERCISE_DAY_REG, 0, req.day));
    writes.push(RegisterWrite::word(EXERCISE_TIME_REG, req.hour, req.minute));
    Ok(writes)
}

/// Bit-weighted encoding of minutes-from-now used by the legacy write.
///
/// Two steps subtract one more than their threshold (2185 and 137); the
/// controller expects exactly this rounding.
pub fn calculate_exercise_time(minutes_from_now: i64) -> u16 {
    const STEPS: [(i64, i64, u16); 13] = [
        (8738, 8738, 0x1000),
        (4369, 4369, 0x0800),
        (2184, 2185, 0x0400),
        (1092, 1092, 0x0200),
        (546, 546, 0x0100),
        (273, 273, 0x0080),
        (136, 137, 0x0040),
        (68, 68, 0x0020),
        (34, 34, 0x0010),
        (17, 17, 0x0008),
        (8, 8, 0x0004),
        (4, 4, 0x0002),
        (2, 2, 0x0001),
    ];
    let mut remainder = minutes_from_now;
    let mut value = 0;
    for (threshold, subtract, bit) in STEPS {
        if remainder >= threshold {
            value |= bit;
            remainder -= subtract;
        }
    }
    value
}

/// Whole minutes from the generator clock to the next matching weekday at
/// the requested time. Same-day earlier times come out negative.
pub fn legacy_minutes(generator_time: NaiveDateTime, req: ExerciseRequest) -> Option<i64> {
    let mut target = generator_time
        .with_hour(u32::from(req.hour))?
        .with_minute(u32::from(req.minute))?;
    while target.weekday().num_days_from_monday() != u32::from(req.day) {
        target += TimeDelta::days(1);
    }
    Some((target - generator_time).num_seconds().div_euclid(60))
}

pub fn legacy_exercise_writes(value: u16) -> Vec<RegisterWrite> {
    indexed(value, 6)
}

/// Controller clock write: three words starting at 000e. Day of week is
/// always written as 0; the controller derives it.
pub fn clock_write(now: NaiveDateTime) -> RegisterWrite {
    let byte = |v: u32| u8::try_from(v).unwrap_or(0);
    let year = u8::try_from(now.year() - 2000).unwrap_or(0);
    RegisterWrite {
        address: CLOCK_REG,
        data: vec![
            byte(now.hour()),
            byte(now.minute()),
            byte(now.month()),
            byte(now.day()),
            0,
            year,
        ],
    }
}

/// Command summary for the `help` verb.
pub fn help_text(enhanced: bool) -> String {
    let mut lines = vec![
        "\nCommands:",
        "   status      - display engine and line information",
        "   maint       - display maintenance and service information",
        "   outage      - display current and last outage (since program launched)",
        "                       info, also shows utility min and max values",
        "   monitor     - display communication statistics and monitor health",
        "   logs        - display all alarm, on/off, and maintenance logs",
        "   registers   - display contents of registers being monitored",
        "   settime     - set generator time to system time",
        "   setexercise - set the exercise time of the generator. ",
        "                      i.e. setexercise=Monday,13:30,Weekly",
    ];
    if enhanced {
        lines.push("                      i.e. setexercise=Monday,13:30,BiWeekly");
        lines.push("                      i.e. setexercise=15,13:30,Monthly");
    }
    lines.extend([
        "   setquiet    - enable or disable exercise quiet mode, ",
        "                      i.e.  setquiet=on or setquiet=off",
        "   setremote   - issue remote command. format is setremote=command, ",
        "                      where command is start, stop, starttransfer,",
        "                      startexercise. i.e. setremote=start",
        "   help        - Display help on commands",
        "\n",
        "To clear the Alarm/Warning message, press OFF on the control panel keypad",
        "followed by the ENTER key. To access Dealer Menu on the Evolution",
        "controller, from the top menu selection (SYSTEM, DATE/TIME,BATTERY, SUB-MENUS)",
        "enter UP UP ESC DOWN UP ESC UP, then go to the dealer menu and press enter.",
        "For liquid cooled models a level 2 dealer code can be entered, ESC UP UP DOWN",
        "DOWN ESC ESC, then navigate to the dealer menu and press enter.",
        "Passcode for Nexus controller is ESC, UP, UP ESC, DOWN, UP, ESC, UP, UP, ENTER.",
        "\n",
    ]);
    lines.into_iter().map(|l| format!("{l}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    #[test]
    fn prefix_and_items() {
        assert_eq!(split_items(""), Err(Rejection::ZeroLength));
        assert_eq!(split_items("status"), Err(Rejection::MissingPrefix));
        assert_eq!(
            split_items("Generator: STATUS  maint"),
            Ok(vec!["status".to_string(), "maint".to_string()])
        );
    }

    #[rstest]
    #[case("registers", true, Resolved::Verb(Verb::Registers))]
    #[case("registers_json", true, Resolved::Verb(Verb::RegistersJson))]
    #[case("registers_json", false, Resolved::WrongChannel)]
    #[case("status_json", true, Resolved::Verb(Verb::StatusJson))]
    #[case("gui_status_json", true, Resolved::Verb(Verb::GuiStatusJson))]
    #[case("setexercise=monday,13:30", false, Resolved::Verb(Verb::SetExercise))]
    #[case("power_log_json=60", true, Resolved::Verb(Verb::PowerLogJson))]
    #[case("getregvalue=0001", true, Resolved::Verb(Verb::GetRegValue))]
    #[case("bogus", true, Resolved::Unknown)]
    fn verb_resolution(#[case] item: &str, #[case] socket: bool, #[case] want: Resolved) {
        assert_eq!(resolve(item, socket), want);
    }

    #[rstest]
    #[case("setremote=start", Ok(RemoteCommand::Start))]
    #[case("setremote=startexercise", Ok(RemoteCommand::StartExercise))]
    #[case("setremote=jump", Err(SETREMOTE_UNKNOWN))]
    #[case("setremote", Err(SETREMOTE_SYNTAX))]
    #[case("xsetremote=start", Err(SETREMOTE_SYNTAX))]
    fn setremote_parsing(#[case] item: &str, #[case] want: Result<RemoteCommand, &'static str>) {
        assert_eq!(parse_setremote(item), want);
    }

    #[test]
    fn remote_is_value_then_index() {
        assert_eq!(
            remote_writes(RemoteCommand::StartTransfer),
            vec![
                RegisterWrite::word(0x0004, 0, 0),
                RegisterWrite::word(0x0003, 0, 2)
            ]
        );
    }

    #[test]
    fn quiet_mode() {
        assert_eq!(parse_setquiet("setquiet=on"), Ok(true));
        assert_eq!(parse_setquiet("setquiet=off"), Ok(false));
        assert_eq!(parse_setquiet("setquiet=maybe"), Err(SETQUIET_SYNTAX));
        assert_eq!(quiet_writes(true), vec![RegisterWrite::word(0x002f, 0, 1)]);
    }

    #[rstest]
    #[case("setexercise=Saturday,13:30", WeekStart::Sunday, Ok((6, 13, 30, ExerciseMode::Weekly)))]
    #[case("setexercise=saturday,13:30", WeekStart::Monday, Ok((5, 13, 30, ExerciseMode::Weekly)))]
    #[case("setexercise=15,07:05,monthly", WeekStart::Sunday, Ok((15, 7, 5, ExerciseMode::Monthly)))]
    #[case("setexercise=29,07:05,monthly", WeekStart::Sunday, Err(SETEXERCISE_SYNTAX))]
    #[case("setexercise=0,07:05,monthly", WeekStart::Sunday, Err(SETEXERCISE_SYNTAX))]
    #[case("setexercise=monday,24:00", WeekStart::Sunday, Err(SETEXERCISE_SYNTAX))]
    #[case("setexercise=monday,12:60", WeekStart::Sunday, Err(SETEXERCISE_SYNTAX))]
    #[case("setexercise=funday,12:00", WeekStart::Sunday, Err(SETEXERCISE_SYNTAX))]
    #[case("setexercise=monday,12:00,daily", WeekStart::Sunday, Err(SETEXERCISE_SYNTAX))]
    #[case("setexercise=monday", WeekStart::Sunday, Err(SETEXERCISE_SYNTAX))]
    fn exercise_parsing(
        #[case] item: &str,
        #[case] start: WeekStart,
        #[case] want: Result<(u8, u8, u8, ExerciseMode), &'static str>,
    ) {
        let got = parse_setexercise(item, start).map(|r| (r.day, r.hour, r.minute, r.mode));
        assert_eq!(got, want);
    }

    #[test]
    fn exercise_writes_need_enhanced_for_monthly() {
        let req = parse_setexercise("setexercise=15,07:05,monthly", WeekStart::Sunday).unwrap();
        assert_eq!(exercise_writes(req, false), Err(SETEXERCISE_SYNTAX));
        assert_eq!(
            exercise_writes(req, true).unwrap(),
            vec![
                RegisterWrite::word(0x002d, 0, 2),
                RegisterWrite::word(0x002e, 0, 15),
                RegisterWrite::word(0x002c, 7, 5),
            ]
        );
    }

    #[rstest]
    #[case(0, 0x0000)]
    #[case(1, 0x0000)]
    #[case(2, 0x0001)]
    #[case(136, 0x0040)]
    #[case(2184, 0x0400)]
    // 1092 + 273 + 68 + 4 + 2, leaving one minute unencoded
    #[case(1440, 0x0200 | 0x0080 | 0x0020 | 0x0002 | 0x0001)]
    #[case(-30, 0x0000)]
    fn legacy_encoding_table(#[case] minutes: i64, #[case] want: u16) {
        assert_eq!(calculate_exercise_time(minutes), want);
    }

    #[test]
    fn legacy_minutes_to_next_weekday() {
        // Thursday 2024-10-17 12:00
        let gen_time = NaiveDate::from_ymd_opt(2024, 10, 17)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let req = parse_setexercise("setexercise=saturday,13:30", WeekStart::Monday).unwrap();
        assert_eq!(legacy_minutes(gen_time, req), Some(2 * 1440 + 90));
        let req = parse_setexercise("setexercise=thursday,11:00", WeekStart::Monday).unwrap();
        assert_eq!(legacy_minutes(gen_time, req), Some(-60));
    }

    #[test]
    fn clock_write_layout() {
        let now = NaiveDate::from_ymd_opt(2024, 10, 17)
            .and_then(|d| d.and_hms_opt(13, 5, 0))
            .unwrap();
        let w = clock_write(now);
        assert_eq!(w.address, 0x000e);
        assert_eq!(w.words(), 3);
        assert_eq!(w.data, vec![13, 5, 10, 17, 0, 24]);
    }

    #[test]
    fn help_mentions_monthly_only_when_enhanced() {
        assert!(help_text(true).contains("setexercise=15,13:30,Monthly"));
        assert!(!help_text(false).contains("Monthly"));
        assert!(help_text(false).ends_with("ENTER.\n\n\n"));
    }
}
