//! Output power log: persistence, history queries and display reduction.

use crate::applog;
use chrono::{NaiveDateTime, TimeDelta};
use std::path::{Path, PathBuf};

/// Timestamp layout of power log lines.
pub const POWER_TIME_FORMAT: &str = "%m/%d/%y %H:%M:%S";

/// Points returned by a history query before reduction kicks in.
pub const HISTORY_MAX_POINTS: usize = 500;

/// Default retention for the daily prune (about one month).
pub const DEFAULT_PRUNE_MINUTES: u64 = 43_800;

pub const INVALID_HISTORY_SYNTAX: &str = "Invalid command syntax for command power_log_json";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    pub at: NaiveDateTime,
    pub kw: f64,
}

impl PowerSample {
    pub fn new(at: NaiveDateTime, kw: f64) -> Self {
        Self { at, kw }
    }

    pub fn timestamp(&self) -> String {
        self.at.format(POWER_TIME_FORMAT).to_string()
    }

    pub fn kw_text(&self) -> String {
        format_kw(self.kw)
    }

    pub fn to_line(&self) -> String {
        format!("{},{}", self.timestamp(), self.kw_text())
    }
}

/// kW as logged: whole numbers keep one decimal (`0.0`, `3.0`).
pub fn format_kw(kw: f64) -> String {
    if kw.fract() == 0.0 {
        format!("{kw:.1}")
    } else {
        format!("{kw}")
    }
}

/// Parse log text into samples in file order (oldest first).
///
/// Blank lines, `#` comments and malformed lines are skipped.
pub fn parse_log(content: &str) -> Vec<PowerSample> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| {
            let (ts, kw) = l.split_once(',')?;
            if kw.contains(',') {
                return None;
            }
            let at = NaiveDateTime::parse_from_str(ts.trim(), POWER_TIME_FORMAT).ok()?;
            let kw = kw.trim().parse::<f64>().ok()?;
            Some(PowerSample { at, kw })
        })
        .collect()
}

/// Bucket width in seconds for a sample `age_secs` old.
fn bucket_width(age_secs: i64, max_samples: usize) -> i64 {
    const HOUR: i64 = 3600;
    const DAY: i64 = 24 * HOUR;
    let span = if age_secs <= HOUR {
        HOUR
    } else if age_secs <= DAY {
        23 * HOUR
    } else if age_secs <= 7 * DAY {
        6 * DAY
    } else {
        25 * DAY
    };
    (span / max_samples.max(1) as i64).max(1)
}

struct Bucket {
    time: NaiveDateTime,
    index: i64,
    width: i64,
    max: f64,
}

/// Reduce newest-first samples to at most `max_samples` display points.
///
/// Samples fall into buckets whose width grows with age; each bucket keeps
/// its maximum. A positive bucket gets zero markers at the neighbouring
/// bucket boundaries unless those neighbours carry power themselves, so
/// short runs still render as spikes. When the markers push the result over
/// the limit the bucket count is lowered and the pass repeated.
pub fn reduce_samples(
    samples: &[PowerSample],
    now: NaiveDateTime,
    max_samples: usize,
) -> Vec<PowerSample> {
    if max_samples == 0 {
        tracing::error!("power sample reduction asked for zero points");
        return Vec::new();
    }
    let mut target = max_samples;
    loop {
        let out = reduce_once(samples, now, target);
        if out.len() <= max_samples {
            return out;
        }
        if target == 1 {
            let mut out = out;
            out.truncate(max_samples);
            return out;
        }
        let scaled = target * max_samples / out.len();
        target = scaled.clamp(1, target - 1);
    }
}

fn reduce_once(samples: &[PowerSample], now: NaiveDateTime, max_samples: usize) -> Vec<PowerSample> {
    let mut out = Vec::new();
    let mut current: Option<Bucket> = None;
    // previous bucket: (time, max, emitted)
    let mut previous: Option<(NaiveDateTime, f64, bool)> = None;

    for s in samples {
        let age = (now - s.at).num_seconds().max(0);
        let width = bucket_width(age, max_samples);
        let index = age / width;
        let time = now - TimeDelta::seconds(index * width);

        match current.as_mut() {
            Some(b) if b.time == time => b.max = b.max.max(s.kw),
            _ => {
                if let Some(b) = current.take() {
                    previous = Some(close_bucket(&b, previous, Some(time), now, &mut out));
                }
                current = Some(Bucket {
                    time,
                    index,
                    width,
                    max: s.kw,
                });
            }
        }
    }
    if let Some(b) = current {
        close_bucket(&b, previous, None, now, &mut out);
    }
    out
}

fn close_bucket(
    b: &Bucket,
    previous: Option<(NaiveDateTime, f64, bool)>,
    older: Option<NaiveDateTime>,
    now: NaiveDateTime,
    out: &mut Vec<PowerSample>,
) -> (NaiveDateTime, f64, bool) {
    let prev_max = previous.map_or(0.0, |p| p.1);
    let emit = b.max > 0.0 || prev_max > 0.0;

    if b.max > 0.0 {
        let newer_edge = now - TimeDelta::seconds((b.index - 1) * b.width);
        let newer_shown = previous.is_some_and(|(t, m, shown)| t == newer_edge && (m > 0.0 || shown));
        if b.index > 0 && !newer_shown {
            out.push(PowerSample::new(newer_edge, 0.0));
        }
    }
    if emit {
        out.push(PowerSample::new(b.time, b.max));
    }
    if b.max > 0.0 {
        let older_edge = now - TimeDelta::seconds((b.index + 1) * b.width);
        if older != Some(older_edge) {
            out.push(PowerSample::new(older_edge, 0.0));
        }
    }
    (b.time, b.max, emit)
}

/// Energy in kWh over newest-first samples: each value holds until the
/// next newer sample.
pub fn energy_kwh(samples: &[PowerSample]) -> f64 {
    samples
        .windows(2)
        .map(|w| {
            let (newer, older) = (w[0], w[1]);
            let hours = (newer.at - older.at).num_seconds().max(0) as f64 / 3600.0;
            older.kw * hours
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq)]
pub enum PowerHistory {
    /// Newest first.
    Samples(Vec<PowerSample>),
    /// kWh formatted `%.2f`.
    Energy(String),
    Invalid(&'static str),
}

impl PowerHistory {
    /// Socket reply: a JSON list of `[timestamp, kW]` pairs, the energy
    /// figure, or the syntax error text.
    pub fn to_reply(&self) -> String {
        match self {
            Self::Samples(v) => {
                let pairs: Vec<[String; 2]> = v.iter().map(|s| [s.timestamp(), s.kw_text()]).collect();
                serde_json::to_string(&pairs).unwrap_or_default()
            }
            Self::Energy(s) => s.clone(),
            Self::Invalid(s) => (*s).to_string(),
        }
    }
}

/// `power_log_json[=minutes[,kw]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub minutes: u64,
    pub kwh: bool,
}

pub fn parse_history_query(cmd: &str) -> Option<HistoryQuery> {
    let parts: Vec<&str> = cmd.split('=').collect();
    if parts.len() > 2 || !parts[0].trim().eq_ignore_ascii_case("power_log_json") {
        return None;
    }
    let Some(args) = parts.get(1) else {
        return Some(HistoryQuery {
            minutes: 0,
            kwh: false,
        });
    };
    let args: Vec<&str> = args.split(',').collect();
    match args.as_slice() {
        [m] => Some(HistoryQuery {
            minutes: m.trim().parse().ok()?,
            kwh: false,
        }),
        [m, unit] => Some(HistoryQuery {
            minutes: m.trim().parse().ok()?,
            kwh: unit.trim().eq_ignore_ascii_case("kw"),
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneOutcome {
    pub message: String,
    /// The log passed 80 % of its size cap.
    pub size_warning: bool,
}

pub const SIZE_WARNING_SUBJECT: &str = "Notice: Log file size warning";
pub const SIZE_WARNING_BODY: &str = "The kwlog file size is 80% of the maximum. Once the log reaches 100% of the maximum size the log will be reset.";

/// The power log file. A `None` path means logging is disabled.
#[derive(Debug, Clone)]
pub struct PowerLog {
    path: Option<PathBuf>,
    max_mb: f64,
}

impl PowerLog {
    pub fn new(path: Option<PathBuf>, max_mb: f64) -> Self {
        Self { path, max_mb }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn append(&self, sample: PowerSample) -> std::io::Result<()> {
        match &self.path {
            Some(p) => applog::append_line(p, &sample.to_line()),
            None => Ok(()),
        }
    }

    /// Whether the log is missing or empty.
    pub fn is_empty(&self) -> bool {
        self.path.as_deref().is_none_or(|p| applog::file_size(p) == 0)
    }

    /// Samples newest first.
    pub fn load(&self) -> std::io::Result<Vec<PowerSample>> {
        let Some(p) = &self.path else {
            return Ok(Vec::new());
        };
        let mut v = parse_log(&applog::read_or_empty(p)?);
        v.reverse();
        Ok(v)
    }

    /// Remove the log and restart it with a zero entry.
    pub fn clear(&self, now: NaiveDateTime) -> String {
        let Some(p) = &self.path else {
            return "Power Log Disabled".to_string();
        };
        if !p.is_file() {
            return "Power Log is empty".to_string();
        }
        let res = std::fs::remove_file(p).and_then(|()| self.append(PowerSample::new(now, 0.0)));
        match res {
            Ok(()) => "Power Log cleared".to_string(),
            Err(e) => {
                tracing::error!(error = %e, "clear power log");
                format!("Error in  ClearPowerLog: {e}")
            }
        }
    }

    /// Drop entries older than `minutes`. A log at its size cap is cleared
    /// instead and still reports `OK`; `minutes == 0` always clears.
    pub fn prune(&self, minutes: u64, now: NaiveDateTime) -> PruneOutcome {
        if minutes == 0 {
            return PruneOutcome {
                message: self.clear(now),
                size_warning: false,
            };
        }
        let Some(p) = &self.path else {
            return PruneOutcome {
                message: "Power Log Disabled".to_string(),
                size_warning: false,
            };
        };
        let size_mb = applog::file_size(p) as f64 / (1024.0 * 1024.0);
        if size_mb >= self.max_mb {
            let cleared = self.clear(now);
            tracing::info!(size_mb, result = %cleared, "power log at size cap");
            return PruneOutcome {
                message: "OK".to_string(),
                size_warning: false,
            };
        }

        let kept = match self.load() {
            Ok(v) => within_minutes(v, minutes, now),
            Err(e) => {
                tracing::error!(error = %e, "read power log for pruning");
                return PruneOutcome {
                    message: format!("Error in  PrunePowerLog: {e}"),
                    size_warning: false,
                };
            }
        };
        let mut content: String = kept.iter().rev().map(|s| s.to_line() + "\n").collect();
        if content.is_empty() {
            content = PowerSample::new(now, 0.0).to_line() + "\n";
        }
        let message = match applog::write_atomic(p, content.as_bytes()) {
            Ok(()) => "OK".to_string(),
            Err(e) => {
                tracing::error!(error = %e, "rewrite power log");
                format!("Error in  PrunePowerLog: {e}")
            }
        };
        PruneOutcome {
            message,
            size_warning: size_mb >= self.max_mb * 0.8,
        }
    }

    /// Answer a `power_log_json` query.
    pub fn history(&self, cmd: &str, now: NaiveDateTime) -> PowerHistory {
        if !self.enabled() {
            return PowerHistory::Samples(Vec::new());
        }
        let Some(q) = parse_history_query(cmd) else {
            tracing::warn!(cmd, "invalid power_log_json syntax");
            return PowerHistory::Invalid(INVALID_HISTORY_SYNTAX);
        };
        let samples = match self.load() {
            Ok(v) if q.minutes > 0 => within_minutes(v, q.minutes, now),
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "read power log");
                Vec::new()
            }
        };
        if q.kwh {
            return PowerHistory::Energy(format!("{:.2}", energy_kwh(&samples)));
        }
        if samples.len() > HISTORY_MAX_POINTS && q.minutes > 0 {
            return PowerHistory::Samples(reduce_samples(&samples, now, HISTORY_MAX_POINTS));
        }
        PowerHistory::Samples(samples)
    }
}

fn within_minutes(samples: Vec<PowerSample>, minutes: u64, now: NaiveDateTime) -> Vec<PowerSample> {
    let limit = i64::try_from(minutes).unwrap_or(i64::MAX);
    samples
        .into_iter()
        .filter(|s| (now - s.at).num_minutes() < limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 17)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    fn ago(secs: i64, kw: f64) -> PowerSample {
        PowerSample::new(now() - TimeDelta::seconds(secs), kw)
    }

    #[test]
    fn log_lines_parse_and_skip_noise() {
        let text = "# header\n10/17/24 11:00:00,0.0\n\ngarbage\n10/17/24 11:00:05,3.5\n10/17/24 11:00:09,1,2\n";
        let v = parse_log(text);
        assert_eq!(v.len(), 2);
        assert_eq!(v[1].to_line(), "10/17/24 11:00:05,3.5");
        assert_eq!(v[0].kw_text(), "0.0");
    }

    #[test]
    fn isolated_spike_gets_zero_markers() {
        let samples = vec![ago(10, 0.0), ago(900, 5.0), ago(2000, 0.0)];
        let out = reduce_samples(&samples, now(), 60);
        let spike = out.iter().position(|s| s.kw == 5.0).unwrap();
        assert!(spike > 0 && spike + 1 < out.len());
        assert_eq!(out[spike - 1].kw, 0.0);
        assert_eq!(out[spike + 1].kw, 0.0);
        assert!(out.len() <= 60);
    }

    #[test]
    fn bucket_keeps_maximum() {
        let samples = vec![ago(5, 1.0), ago(6, 4.0), ago(7, 2.0)];
        let out = reduce_samples(&samples, now(), 10);
        assert!(out.iter().any(|s| s.kw == 4.0));
        assert!(!out.iter().any(|s| s.kw == 1.0 || s.kw == 2.0));
    }

    #[test]
    fn history_query_syntax() {
        assert_eq!(
            parse_history_query("power_log_json"),
            Some(HistoryQuery { minutes: 0, kwh: false })
        );
        assert_eq!(
            parse_history_query("power_log_json=1440,kw"),
            Some(HistoryQuery { minutes: 1440, kwh: true })
        );
        assert_eq!(parse_history_query("power_log_json=abc"), None);
        assert_eq!(parse_history_query("power_log_json=1=2"), None);
        assert_eq!(parse_history_query("power_log_json=1,2,3"), None);
    }

    #[test]
    fn energy_is_integrated_between_samples() {
        let v = vec![ago(0, 0.0), ago(1800, 4.0), ago(3600, 0.0)];
        assert!((energy_kwh(&v) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn file_round_trip_prune_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kwlog.txt");
        let log = PowerLog::new(Some(path.clone()), 15.0);
        assert_eq!(log.clear(now()), "Power Log is empty");

        log.append(ago(7200, 0.0)).unwrap();
        log.append(ago(60, 2.5)).unwrap();
        log.append(ago(30, 0.0)).unwrap();

        match log.history("power_log_json=10", now()) {
            PowerHistory::Samples(v) => assert_eq!(v.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            log.history("power_log_json=10,kw", now()).to_reply(),
            "0.02"
        );
        assert_eq!(
            log.history("power_log_json=x", now()).to_reply(),
            INVALID_HISTORY_SYNTAX
        );

        let outcome = log.prune(10, now());
        assert_eq!(outcome.message, "OK");
        assert!(!outcome.size_warning);
        assert_eq!(log.load().unwrap().len(), 2);

        assert_eq!(log.clear(now()), "Power Log cleared");
        let v = log.load().unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kw, 0.0);

        let disabled = PowerLog::new(None, 15.0);
        assert_eq!(disabled.clear(now()), "Power Log Disabled");
        assert_eq!(disabled.history("power_log_json", now()).to_reply(), "[]");
    }

    #[test]
    fn prune_at_size_cap_clears_and_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kwlog.txt");
        let log = PowerLog::new(Some(path), 0.000_01);
        for i in 0..10 {
            log.append(ago(60 * i, 2.5)).unwrap();
        }

        let outcome = log.prune(10, now());
        assert_eq!(outcome.message, "OK");
        let v = log.load().unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kw, 0.0);
    }
}
