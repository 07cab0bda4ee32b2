//! Utility outage detection with threshold/pickup hysteresis.
//!
//! The tracker only holds state and reports transitions. Logging the closed
//! record and sending notices is left to the caller.

use crate::decode::TransferState;
use crate::util::format_duration;
use chrono::{NaiveDateTime, TimeDelta};

pub const DEFAULT_THRESHOLD_VOLTAGE: u16 = 143;
pub const DEFAULT_PICKUP_VOLTAGE: u16 = 190;

/// Timestamp layout for outage records and notices.
pub const OUTAGE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One reading of the line side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineReading {
    pub utility: u16,
    /// 0 selects [`DEFAULT_THRESHOLD_VOLTAGE`].
    pub threshold: u16,
    /// 0 selects [`DEFAULT_PICKUP_VOLTAGE`].
    pub pickup: u16,
    /// Transfer switch position, where the controller reports one.
    pub transfer: Option<TransferState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutageEvent {
    Started { at: NaiveDateTime },
    Ended { start: NaiveDateTime, duration: TimeDelta },
    Transfer(TransferState),
}

impl OutageEvent {
    /// Notice subject prefix; the site name follows.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Started { .. } => "Outage Notice at ",
            Self::Ended { .. } => "Outage Recovery Notice at ",
            Self::Transfer(_) => "Transfer Switch Changed State Notice at ",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::Started { at } => {
                format!("\nUtility Power Out at {}", at.format(OUTAGE_TIME_FORMAT))
            }
            Self::Ended { duration, .. } => format!(
                "\nUtility Power Restored. Duration of outage {}",
                format_duration(*duration)
            ),
            Self::Transfer(TransferState::Utility) => {
                "\nPower is being supplied by the utility line. ".to_string()
            }
            Self::Transfer(TransferState::Generator) => {
                "\nPower is being supplied by the generator. ".to_string()
            }
        }
    }

    /// Line appended to the outage log, for closed outages only.
    pub fn log_line(&self) -> Option<String> {
        match self {
            Self::Ended { start, duration } => Some(format!(
                "{},{}",
                start.format(OUTAGE_TIME_FORMAT),
                format_duration(*duration)
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutageTracker {
    in_outage: bool,
    outage_start: Option<NaiveDateTime>,
    last_duration: Option<TimeDelta>,
    volts_min: u16,
    volts_max: u16,
    transfer_active: bool,
}

impl OutageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, reading: LineReading, now: NaiveDateTime) -> Vec<OutageEvent> {
        let volts = reading.utility;
        let threshold = if reading.threshold == 0 {
            DEFAULT_THRESHOLD_VOLTAGE
        } else {
            reading.threshold
        };
        let pickup = if reading.pickup == 0 {
            DEFAULT_PICKUP_VOLTAGE
        } else {
            reading.pickup
        };

        if self.volts_min == 0 && self.volts_max == 0 {
            self.volts_min = volts;
            self.volts_max = volts;
        }
        if volts > self.volts_max && volts > pickup {
            self.volts_max = volts;
        }
        if volts < self.volts_min && volts > threshold {
            self.volts_min = volts;
        }

        let mut events = Vec::new();
        match reading.transfer {
            Some(TransferState::Utility) if self.transfer_active => {
                self.transfer_active = false;
                events.push(OutageEvent::Transfer(TransferState::Utility));
            }
            Some(TransferState::Generator) if !self.transfer_active => {
                self.transfer_active = true;
                events.push(OutageEvent::Transfer(TransferState::Generator));
            }
            _ => {}
        }

        if self.in_outage {
            if volts > pickup {
                self.in_outage = false;
                let start = self.outage_start.unwrap_or(now);
                let duration = now - start;
                self.last_duration = Some(duration);
                events.push(OutageEvent::Ended { start, duration });
            }
        } else if volts < threshold {
            self.in_outage = true;
            self.outage_start = Some(now);
            events.push(OutageEvent::Started { at: now });
        }
        events
    }

    pub fn in_outage(&self) -> bool {
        self.in_outage
    }

    pub fn outage_start(&self) -> Option<NaiveDateTime> {
        self.outage_start
    }

    pub fn last_duration(&self) -> Option<TimeDelta> {
        self.last_duration
    }

    pub fn volts_min(&self) -> u16 {
        self.volts_min
    }

    pub fn volts_max(&self) -> u16 {
        self.volts_max
    }

    /// One-line summary for the outage report.
    pub fn status_line(&self) -> String {
        match (self.in_outage, self.outage_start, self.last_duration) {
            (true, Some(start), _) => {
                format!("System in outage since {}", start.format(OUTAGE_TIME_FORMAT))
            }
            (false, Some(start), Some(d)) => format!(
                "Last outage occurred at {} and lasted {}.",
                start.format(OUTAGE_TIME_FORMAT),
                format_duration(d)
            ),
            _ => "No outage has occurred since program launched.".to_string(),
        }
    }
}

/// Outage log entries rendered for display, newest first, at most 50.
///
/// Blank and `#` lines are skipped. Durations past a day contain a comma,
/// so a line may split into three fields.
pub fn history_lines(content: &str) -> Vec<String> {
    let mut out: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| {
            let items: Vec<&str> = l.split(',').collect();
            match items.as_slice() {
                [start, d] => Some(format!("{start}, Duration: {d}")),
                [start, days, hms] => Some(format!("{start}, Duration: {days},{hms}")),
                _ => None,
            }
        })
        .collect();
    out.reverse();
    out.truncate(50);
    out
}
