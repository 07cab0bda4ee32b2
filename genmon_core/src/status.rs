//! Report trees for the query surface.
//!
//! Every builder works on a [`Snapshot`] taken under the store lock, so a
//! report is internally consistent even while the poller keeps running.

use crate::decode::{self, ServiceItem};
use crate::identity::{self, Identity, ModelDefaults};
use crate::logs;
use crate::outage::OutageTracker;
use crate::registers::{self, MODEL_REG};
use crate::report::Node;
use crate::store::StoreStats;
use crate::util::format_duration;
use chrono::{NaiveDateTime, TimeDelta};
use genmon_config::AlarmCatalog;
use genmon_traits::TransportStats;
use std::collections::BTreeMap;

pub const MONITOR_TIME_FORMAT: &str = "%A %B %-d, %Y %H:%M:%S";

/// Registers and the fixed facts needed to describe them.
pub struct Snapshot<'a> {
    pub regs: BTreeMap<u16, String>,
    pub id: Identity,
    pub catalog: &'a AlarmCatalog,
    pub defaults: &'a ModelDefaults,
    pub enhanced_exercise: bool,
    pub display_unknown: bool,
}

impl Snapshot<'_> {
    fn logs(&self, all: bool, raw: bool) -> logs::LogListing {
        logs::display_logs(&self.regs, self.id, self.catalog, all, raw)
    }

    pub fn alarm_text(&self) -> String {
        decode::alarm_state(&self.regs, self.id, self.catalog)
            .map(|a| a.to_string())
            .unwrap_or_default()
    }
}

pub fn status_report(s: &Snapshot<'_>, outage: &OutageTracker, now: NaiveDateTime) -> Node {
    let v = &s.regs;
    let id = s.id;

    let mut engine = Node::map()
        .with_value("Switch State", decode::switch_text(v))
        .with_value("Engine State", decode::engine_text(v));
    if id.is_evo_lc() {
        engine.push_value("Active Relays", decode::digital_outputs(v, id));
        engine.push_value("Active Sensors", decode::sensor_inputs(v, id, &s.defaults.fuel_type));
    }
    if decode::in_alarm(v) {
        engine.push_value("System In Alarm", s.alarm_text());
    }
    engine.push_value("Battery Voltage", decode::battery_voltage_text(v));
    if id.is_evo_lc() {
        engine.push_value("Battery Status", decode::battery_status(v, id));
    }
    engine
        .push_value("RPM", decode::rpm_text(v))
        .push_value("Frequency", decode::frequency_text(v, id))
        .push_value("Output Voltage", decode::output_voltage_text(v));
    if id.is_evo_lc() {
        engine.push_value("Output Current", decode::current_text(v, id));
        engine.push_value("Output Power (Single Phase)", decode::power_text(v, id));
    }
    engine.push_value("Active Rotor Poles (Calculated)", decode::rotor_poles_text(v, id));
    if s.display_unknown {
        engine.push("Unsupported Sensors", unknown_sensors(s));
    }

    let mut line = Node::map();
    if id.evolution {
        line.push_value(
            "Transfer Switch State",
            decode::transfer_state(v, id).map(|t| t.to_string()).unwrap_or_default(),
        );
    }
    line.push_value("Utility Voltage", decode::utility_voltage_text(v))
        .push_value("Utility Voltage Max", format!("{}V ", outage.volts_max()))
        .push_value("Utility Voltage Min", format!("{}V ", outage.volts_min()))
        .push_value("Utility Threshold Voltage", decode::threshold_voltage_text(v));
    if id.is_evo_lc() {
        line.push_value("Utility Pickup Voltage", decode::pickup_voltage_text(v));
        line.push_value("Set Output Voltage", decode::set_output_voltage_text(v, id));
    }

    let time = Node::map()
        .with_value("Monitor Time", now.format(MONITOR_TIME_FORMAT).to_string())
        .with_value("Generator Time", decode::generator_time_text(v));

    let stat = Node::map()
        .with("Engine", engine)
        .with("Line State", line)
        .with("Last Log Entries", s.logs(false, false).node)
        .with("Time", time);
    Node::map().with("Status", stat)
}

/// Sensors whose meaning is not confirmed, shown only on request.
pub fn unknown_sensors(s: &Snapshot<'_>) -> Node {
    let v = &s.regs;
    let id = s.id;
    let mut out = Node::map();

    if let Some(raw) = decode::unknown_sensor(v, 0x003c, false) {
        out.push_value("Raw RPM Sensor", raw);
        out.push_value("Frequency (Calculated)", decode::frequency_text(v, id));
    }
    if id.evolution
        && let Some(raw) = decode::unknown_sensor(v, 0x0208, false)
    {
        out.push_value("Calibrate Volts Value", raw);
    }
    if id.is_evo_lc() {
        out.push_value("Battery Status (Sensor)", decode::battery_status_from_sensor(v, id));
        if let Some(raw) = decode::reg_u16(v, 0x05ee) {
            out.push_value("Battery Charger Sensor", format!("{:.1}", f64::from(raw) / 10.0));
        }
        if let Some(raw) = decode::reg_u16(v, 0x05ed)
            && let Some((c, f)) = decode::ambient_temperature(raw)
        {
            out.push_value("Ambient Temp Thermistor", format!("Sensor: {raw}, {c:.1}C, {f:.1}F"));
        }
        if let Some(h) = decode::reg_u16(v, 0x0054) {
            out.push_value("Hours of Protection", format!("{h} H"));
        }
    }
    if id.is_evo_ac() {
        out.push_value("Output Current", decode::current_text(v, id));
        out.push_value("Output Power (Single Phase)", decode::power_text(v, id));
        for (reg, label) in [(0x05f6, "Calibrate Current 1 Value"), (0x05f7, "Calibrate Current 2 Value")] {
            if let Some(raw) = decode::unknown_sensor(v, reg, false) {
                out.push_value(label, raw);
            }
        }
    }
    if !id.liquid_cooled {
        if let Some(raw) = decode::unknown_sensor(v, 0x0032, true) {
            let n: f64 = raw.parse().unwrap_or(0.0);
            out.push_value("Unsupported Sensor 1", format!("{:.2}", n / 100.0));
        }
        if let Some(raw) = decode::unknown_sensor(v, 0x0033, false) {
            out.push_value("Unsupported Sensor 2", raw);
        }
        if let Some(raw) = decode::reg_u16(v, 0x0034) {
            out.push_value("Unsupported Sensor 3", i16::from_be_bytes(raw.to_be_bytes()).to_string());
        }
        if let Some(raw) = decode::unknown_sensor(v, 0x003b, false) {
            out.push_value("Unsupported Sensor 4", raw);
        }
    }
    out
}

fn service_label(id: Identity, item: ServiceItem) -> Option<&'static str> {
    match (id.evolution, id.liquid_cooled, item) {
        (true, _, ServiceItem::A) => Some("Service A Due"),
        (true, _, ServiceItem::B) => Some("Service B Due"),
        (false, _, ServiceItem::Air) => Some("Air Filter Service Due"),
        (false, true, ServiceItem::Oil) => Some("Oil Change and Filter Due"),
        (false, true, ServiceItem::Spark) => Some("Spark Plug Change Due"),
        (false, false, ServiceItem::Oil) => Some("Oil and Oil Filter Service Due"),
        (false, false, ServiceItem::Spark) => Some("Spark Plug Service Due"),
        (false, false, ServiceItem::Battery) => Some("Battery Service Due"),
        _ => None,
    }
}

pub fn maintenance_report(s: &Snapshot<'_>) -> Node {
    let v = &s.regs;
    let id = s.id;
    let d = s.defaults;

    let mut exercise =
        Node::map().with_value("Exercise Time", decode::exercise_time_text(v, s.enhanced_exercise));
    if id.is_evo_lc() {
        exercise.push_value("Exercise Duration", decode::exercise_duration_text(v, id));
    }

    let mut service = Node::map();
    for &item in ServiceItem::for_identity(id) {
        if let Some(label) = service_label(id, item) {
            service.push_value(
                label,
                format!(
                    "{} or {}",
                    decode::service_due_text(v, id, item),
                    decode::service_due_date(v, id, item)
                ),
            );
        }
    }
    service
        .push_value("Total Run Hours", decode::run_hours_text(v, id))
        .push_value("Hardware Version", decode::hardware_version(v))
        .push_value("Firmware Version", decode::firmware_version(v));

    let maint = Node::map()
        .with_value("Model", d.model.clone())
        .with_value("Generator Serial Number", decode::serial_number(v))
        .with_value("Controller", identity::controller_name(v))
        .with_value("Nominal RPM", d.nominal_rpm.to_string())
        .with_value("Rated kW", d.nominal_kw.to_string())
        .with_value("Nominal Frequency", d.nominal_frequency.to_string())
        .with_value("Fuel Type", d.fuel_type.clone())
        .with("Exercise", exercise)
        .with("Service", service);
    Node::map().with("Maintenance", maint)
}

pub fn outage_report(s: &Snapshot<'_>, tracker: &OutageTracker, history: Vec<String>) -> Node {
    let v = &s.regs;
    let mut data = Node::map().with_value("Status", tracker.status_line());
    let utility = decode::utility_voltage_text(v);
    if !utility.is_empty() {
        data.push_value("Utility Voltage", utility);
    }
    data.push_value("Utility Voltage Minimum", format!("{}V ", tracker.volts_min()))
        .push_value("Utility Voltage Maximum", format!("{}V ", tracker.volts_max()))
        .push_value("Utility Threshold Voltage", decode::threshold_voltage_text(v));
    if s.id.is_evo_lc() {
        data.push_value("Utility Pickup Voltage", decode::pickup_voltage_text(v));
    }
    if s.id.evolution {
        data.push_value("Startup Delay", decode::startup_delay_text(v, s.id));
    }
    data.push("Outage Log", Node::List(history.into_iter().map(Node::Value).collect()));
    Node::map().with("Outage", data)
}

pub fn registers_report(s: &Snapshot<'_>, stats: StoreStats, all: bool) -> Node {
    let evolution = s.id.evolution;
    let base: Vec<Node> = s
        .regs
        .iter()
        .filter(|(a, _)| {
            registers::classify(**a, evolution).is_some_and(|c| !c.is_log())
        })
        .chain(s.regs.get_key_value(&MODEL_REG))
        .map(|(a, val)| Node::map().with_value(registers::reg_name(*a), val.clone()))
        .collect();

    let mut regs = Node::map()
        .with_value("Num Regs", s.regs.len().to_string())
        .with_value("Not Changed", stats.unchanged.to_string())
        .with_value("Changed", stats.changed.to_string())
        .with_value("Total Changed", format!("{:.2}", stats.ratio()))
        .with("Base Registers", Node::List(base));
    if all {
        regs.push("Log Registers", s.logs(true, true).node);
    }
    Node::map().with("Registers", regs)
}

pub fn logs_report(s: &Snapshot<'_>) -> logs::LogListing {
    s.logs(true, false)
}

/// Link and process facts for the monitor report.
#[derive(Debug, Clone)]
pub struct MonitorFacts {
    pub health: String,
    pub controller: String,
    pub run_time: TimeDelta,
    pub link: TransportStats,
    pub failed_polls: u64,
}

pub fn monitor_report(m: &MonitorFacts) -> Node {
    let link = &m.link;
    let crc_ratio = if link.crc_errors == 0 || link.rx_packets == 0 {
        0.0
    } else {
        link.crc_errors as f64 / link.rx_packets as f64
    };
    let secs = link.elapsed.as_secs_f64();
    let per_second = if secs > 0.0 {
        (link.tx_packets + link.rx_packets) as f64 / secs
    } else {
        0.0
    };

    let genmon = Node::map()
        .with_value("Monitor Health", m.health.clone())
        .with_value("Controller", m.controller.clone())
        .with_value(
            "Run time",
            format!("genmon running for {}.", format_duration(m.run_time)),
        )
        .with_value("Generator Monitor Version", env!("CARGO_PKG_VERSION"));

    let mut serial = Node::map()
        .with_value(
            "Packet Count",
            format!("M: {}, S: {}", link.tx_packets, link.rx_packets),
        )
        .with_value("CRC Errors", format!("{} ", link.crc_errors))
        .with_value("CRC Percent Errors", format!("{crc_ratio:.2}"))
        .with_value("Discarded Bytes", link.discarded_bytes.to_string())
        .with_value("Serial Restarts", link.restarts.to_string())
        .with_value("Serial Timeouts", link.timeouts.to_string())
        .with_value("Failed Polls", m.failed_polls.to_string())
        .with_value("Packets Per Second", format!("{per_second:.2}"));
    if link.rx_packets > 0 {
        let avg = link.transaction_time.as_secs_f64() / link.rx_packets as f64;
        serial.push_value("Average Transaction Time", format!("{avg:.4} sec"));
    }

    let data = Node::map()
        .with("Generator Monitor Stats", genmon)
        .with("Serial Stats", serial);
    Node::map().with("Monitor", data)
}

/// Compact status polled by the web UI.
pub fn gui_status(s: &Snapshot<'_>, unsent_feedback: bool) -> Node {
    let v = &s.regs;
    let unsent = if unsent_feedback { "True" } else { "False" };
    Node::map()
        .with_value("basestatus", decode::base_status(v, s.id))
        .with_value("kwOutput", decode::power_text(v, s.id))
        .with_value("Exercise", decode::parsed_exercise_time(v, s.enhanced_exercise))
        .with_value("UnsentFeedback", unsent)
}

pub fn start_info(site: &str, id: Identity, d: &ModelDefaults) -> Node {
    Node::map()
        .with_value("sitename", site)
        .with_value("fueltype", d.fuel_type.clone())
        .with_value("model", d.model.clone())
        .with_value("nominalKW", d.nominal_kw.to_string())
        .with_value("nominalRPM", d.nominal_rpm.to_string())
        .with_value("nominalfrequency", d.nominal_frequency.to_string())
        .with_value("Controller", id.configured_name())
}

const CLEAR_ALARM_HINT: &str =
    "\nTo clear the Alarm/Warning message, press OFF on the control panel keypad followed by the ENTER key.\n";

/// Subject and body of the notice sent when register 0001 changes.
pub fn alarm_notice(s: &Snapshot<'_>, site: &str, status: u32) -> (String, String) {
    let v = &s.regs;
    let mut body = String::from("\n\nNotice from Generator: \n\n");
    let switch = decode::switch_text(v);
    if !switch.is_empty() {
        body.push_str(&format!("Switch State: {switch}\n"));
    }
    let engine = decode::EngineState::from_status(status);
    body.push_str(&format!("Engine State: {engine}\n"));
    if s.id.is_evo_lc() {
        body.push_str(&format!("Active Relays: {}\n", decode::digital_outputs(v, s.id)));
        body.push_str(&format!(
            "Active Sensors: {}\n",
            decode::sensor_inputs(v, s.id, &s.defaults.fuel_type)
        ));
    }

    let alarmed = decode::in_alarm(v);
    let subject = if alarmed {
        let alarm = s.alarm_text();
        if alarm.is_empty() {
            body.push_str("\nSystem In Alarm! Please check alarm log\n");
        } else {
            body.push_str(&format!("\nCurrent Alarm: {alarm}\n"));
        }
        body.push_str(&format!("System In Alarm: 0001:{status:08x}\n"));
        format!("Generator Alert at {site}: CRITICAL ")
    } else {
        body.push_str(&format!("\nNo Alarms: 0001:{status:08x}\n"));
        format!("Generator Notice: {site}")
    };

    body.push_str("\nLast Log Entries:\n");
    body.push_str(&s.logs(false, false).node.to_text());
    if alarmed {
        body.push_str(CLEAR_ALARM_HINT);
    }
    (subject, body)
}
