//! Master emulation: the order in which registers are requested.
//!
//! The controller expects the same traffic the factory panel would generate:
//! the base table in a fixed order, with the prime set refreshed ahead of
//! every sixth base request. Each prime refresh is followed by an alarm-check
//! signal so alarm handling always sees fresh status.

use crate::error::GenmonError;
use crate::registers::{self, DEBUG_SCAN, LogWindow, PRIME_REGISTERS};

/// Base requests between prime refreshes.
pub const PRIME_EVERY: usize = 6;

/// The seam between request ordering and the link.
pub trait Poll {
    /// Read `words` registers at `address` and store the result.
    fn poll(&self, address: u16, words: u16) -> Result<(), GenmonError>;
    /// Ask the alarm loop to run a check.
    fn alarm_check_due(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requests: usize,
    pub failures: usize,
}

impl SweepReport {
    pub(crate) fn record(&mut self, r: Result<(), GenmonError>) {
        self.requests += 1;
        if r.is_err() {
            self.failures += 1;
        }
    }

    pub(crate) fn merge(&mut self, other: Self) {
        self.requests += other.requests;
        self.failures += other.failures;
    }

    /// Every request in the sweep failed.
    pub fn all_failed(&self) -> bool {
        self.requests > 0 && self.requests == self.failures
    }
}

pub fn poll_primes(p: &impl Poll) -> SweepReport {
    let mut report = SweepReport::default();
    for &(address, bytes) in PRIME_REGISTERS {
        report.record(p.poll(address, bytes / 2));
    }
    report
}

/// One pass over `base`, interleaving prime refreshes and alarm signals.
pub fn sweep(p: &impl Poll, base: &[u16]) -> SweepReport {
    let mut report = SweepReport::default();
    for (i, &address) in base.iter().enumerate() {
        if i % PRIME_EVERY == 0 {
            report.merge(poll_primes(p));
            p.alarm_check_due();
        }
        report.record(p.poll(address, 1));
    }
    report
}

/// Re-read every record of the given log windows.
pub fn reread_logs(p: &impl Poll, windows: &[LogWindow]) -> SweepReport {
    let mut report = SweepReport::default();
    for &w in windows {
        for address in w.records() {
            report.record(p.poll(address, w.stride()));
        }
    }
    report
}

/// Probe addresses the tables do not cover, one word each.
pub fn debug_scan(p: &impl Poll, evolution: bool) -> SweepReport {
    let mut report = SweepReport::default();
    for address in DEBUG_SCAN.filter(|a| !registers::is_known(*a, evolution)) {
        report.record(p.poll(address, 1));
    }
    report
}

/// Newest record of each log window, read once at start-up.
pub fn log_heads(evolution: bool) -> Vec<(u16, u16)> {
    let alarm = if evolution {
        LogWindow::Alarm
    } else {
        LogWindow::NexusAlarm
    };
    let mut heads = vec![
        (alarm.start(), alarm.stride()),
        (LogWindow::Start.start(), LogWindow::Start.stride()),
    ];
    if evolution {
        heads.push((LogWindow::Service.start(), LogWindow::Service.stride()));
    }
    heads
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(u16, u16)>>,
        signals: RefCell<Vec<usize>>,
        failing: Option<u16>,
    }

    impl Poll for Recorder {
        fn poll(&self, address: u16, words: u16) -> Result<(), GenmonError> {
            self.calls.borrow_mut().push((address, words));
            if self.failing == Some(address) {
                return Err(GenmonError::Timeout);
            }
            Ok(())
        }

        fn alarm_check_due(&self) {
            let n = self.calls.borrow().len();
            self.signals.borrow_mut().push(n);
        }
    }

    #[test]
    fn primes_precede_every_sixth_base_request() {
        let r = Recorder::default();
        let base = [0x0000, 0x0005, 0x0006, 0x0007, 0x0008, 0x000a, 0x000b];
        let report = sweep(&r, &base);
        let calls = r.calls.borrow();
        assert_eq!(report.requests, 7 + 2 * PRIME_REGISTERS.len());
        assert_eq!(calls[0], (0x0001, 2));
        assert_eq!(calls[PRIME_REGISTERS.len()], (0x0000, 1));
        // signal fires after the primes, before the base request
        assert_eq!(*r.signals.borrow(), vec![5, 5 + 6 + 5]);
    }

    #[test]
    fn failures_do_not_stop_the_sweep() {
        let r = Recorder {
            failing: Some(0x0006),
            ..Recorder::default()
        };
        let report = sweep(&r, &[0x0005, 0x0006, 0x0007]);
        assert_eq!(report.failures, 1);
        assert!(!report.all_failed());
        assert_eq!(r.calls.borrow().last(), Some(&(0x0007, 1)));
    }

    #[test]
    fn heads_follow_family() {
        assert_eq!(log_heads(true), vec![(0x03e8, 5), (0x012c, 4), (0x04e2, 4)]);
        assert_eq!(log_heads(false), vec![(0x0064, 4), (0x012c, 4)]);
    }

    #[test]
    fn debug_scan_skips_known_registers() {
        let r = Recorder::default();
        debug_scan(&r, true);
        let calls = r.calls.borrow();
        assert!(calls.iter().all(|(_, w)| *w == 1));
        assert!(!calls.iter().any(|(a, _)| *a == 0x0005 || *a == 0x012c));
        assert!(calls.iter().any(|(a, _)| *a == 0x0013));
    }

    #[test]
    fn log_reread_covers_every_record() {
        let r = Recorder::default();
        let report = reread_logs(&r, LogWindow::for_family(false));
        assert_eq!(report.requests, 100);
    }
}
