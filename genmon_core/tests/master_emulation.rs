//! Master emulation against the simulated controller.
//!
//! Verifies that:
//! - One sweep refreshes the prime set ceil(N/6) times and reads each base register once
//! - Every refresh raises an alarm-check signal, coalesced into one pending signal
//! - A dead link fails the whole sweep and counts failed polls

use genmon_config::{AlarmCatalog, Config};
use genmon_core::Device;
use genmon_core::mocks::NullNotifier;
use genmon_core::registers::{BASE_REGISTERS, PRIME_REGISTERS};
use genmon_core::scheduler::{self, PRIME_EVERY};
use genmon_hardware::{SimHandle, SimulatedController};
use genmon_traits::MonotonicClock;
use std::sync::Arc;

fn device() -> (Device, SimHandle) {
    let sim = SimulatedController::preset(0x0c);
    let handle = sim.handle();
    let dir = std::env::temp_dir().join("genmon-master-emulation-feedback.json");
    let mut cfg = Config::default();
    cfg.paths.feedback_file = dir;
    let dev = Device::new(
        cfg,
        Box::new(sim),
        AlarmCatalog::default(),
        Arc::new(NullNotifier),
        Arc::new(MonotonicClock::new()),
    );
    (dev, handle)
}

#[test]
fn sweep_interleaves_primes() {
    let (dev, sim) = device();
    let report = scheduler::sweep(&dev, BASE_REGISTERS);
    let reads = sim.reads();

    let n = BASE_REGISTERS.len();
    let refreshes = n.div_ceil(PRIME_EVERY);
    let status_reads = reads.iter().filter(|(a, _)| *a == 0x0001).count();
    assert_eq!(status_reads, refreshes);
    assert_eq!(report.requests, n + refreshes * PRIME_REGISTERS.len());
    assert_eq!(report.failures, 0);

    for base in BASE_REGISTERS {
        let hits = reads.iter().filter(|(a, w)| a == base && *w == 1).count();
        assert_eq!(hits, 1, "base register {base:04x}");
    }
    // signals coalesce into one pending check
    assert!(dev.alarm_signals().try_recv().is_ok());
    assert!(dev.alarm_signals().try_recv().is_err());
}

#[test]
fn offline_link_fails_the_sweep() {
    let (dev, sim) = device();
    sim.set_offline(true);
    let report = scheduler::sweep(&dev, &BASE_REGISTERS[..6]);
    assert!(report.all_failed());
    assert_eq!(dev.failed_polls(), report.requests as u64);

    sim.heal();
    let report = scheduler::sweep(&dev, &BASE_REGISTERS[..6]);
    assert!(!report.all_failed());
}
