//! Shared per-connection context: the link, the register store and the
//! derived state every loop reads.
//!
//! A `Device` lives from one (re)connect to the next. Reload builds a fresh
//! one, so counters, identity and the store all start over.

use crate::applog;
use crate::commands::{self, ExerciseMode, RegisterWrite, Verb, WeekStart};
use crate::decode::{self, AlarmState, EngineState};
use crate::error::{GenmonError, map_transport_error};
use crate::feedback::FeedbackRecorder;
use crate::identity::{self, Identity, ModelDefaults};
use crate::outage::{LineReading, OutageTracker, history_lines};
use crate::power::{PowerLog, PowerSample, SIZE_WARNING_BODY, SIZE_WARNING_SUBJECT};
use crate::registers::{
    self, BASE_REGISTERS, CONTROLLER_REG, LogWindow, MODEL_REG, MODEL_WORDS, STATUS_REG,
};
use crate::report::Node;
use crate::scheduler::{self, Poll, SweepReport};
use crate::status::{self, MonitorFacts, Snapshot};
use crate::store::{Change, ChangeKind, RegisterStore, StoreStats, UpdateOutcome};
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use crossbeam_channel::{Receiver, Sender};
use genmon_config::{AlarmCatalog, Config};
use genmon_traits::{BoxError, Category, Clock, Notifier, Transport, TransportStats};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

pub const REGISTER_ALERT_SUBJECT: &str = "Monitor Register Alert: ";
pub const UNDER_TEST_SUBJECT: &str = "Register Under Test";

/// Longest wait for the top of the minute before a clock write.
const SET_TIME_WAIT: Duration = Duration::from_secs(61);

/// Stand-in left behind by [`Device::close_link`].
struct ClosedLink {
    stats: TransportStats,
}

impl Transport for ClosedLink {
    fn read_registers(&mut self, _: u16, _: u16, _: Duration) -> Result<String, BoxError> {
        Err("link closed".into())
    }

    fn write_registers(&mut self, _: u16, _: u16, _: &[u8], _: Duration) -> Result<(), BoxError> {
        Err("link closed".into())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

pub struct Device {
    cfg: Config,
    link: ReentrantMutex<RefCell<Box<dyn Transport>>>,
    timeout: Duration,
    store: RwLock<RegisterStore>,
    identity: RwLock<Identity>,
    defaults: RwLock<ModelDefaults>,
    legacy_write: AtomicBool,
    catalog: AlarmCatalog,
    notifier: Arc<dyn Notifier>,
    clock: SharedClock,
    feedback: FeedbackRecorder,
    outage: Mutex<OutageTracker>,
    power_log: PowerLog,
    init_complete: AtomicBool,
    comm_active: AtomicBool,
    last_status: Mutex<Option<u32>>,
    alarm_tx: Sender<()>,
    alarm_rx: Receiver<()>,
    started: NaiveDateTime,
    failed_polls: AtomicU64,
    under_test_log: Mutex<String>,
}

impl Device {
    pub fn new(
        cfg: Config,
        transport: Box<dyn Transport>,
        catalog: AlarmCatalog,
        notifier: Arc<dyn Notifier>,
        clock: SharedClock,
    ) -> Self {
        let identity = Identity::new(
            cfg.controller.evolution.unwrap_or(true),
            cfg.controller.liquid_cooled.unwrap_or(false),
        );
        let (alarm_tx, alarm_rx) = crossbeam_channel::bounded(1);
        let feedback = FeedbackRecorder::open(
            cfg.monitor.feedback_enabled,
            cfg.paths.feedback_file.clone(),
            notifier.clone(),
        );
        let power_log = PowerLog::new(cfg.paths.power_log.clone(), cfg.power.max_log_mb);
        let started = clock.wall();
        Self {
            timeout: Duration::from_millis(cfg.transport.timeout_ms),
            link: ReentrantMutex::new(RefCell::new(transport)),
            store: RwLock::new(RegisterStore::new(identity.evolution)),
            identity: RwLock::new(identity),
            defaults: RwLock::new(ModelDefaults::default()),
            legacy_write: AtomicBool::new(cfg.controller.legacy_write),
            catalog,
            notifier,
            clock,
            feedback,
            outage: Mutex::new(OutageTracker::new()),
            power_log,
            init_complete: AtomicBool::new(false),
            comm_active: AtomicBool::new(false),
            last_status: Mutex::new(None),
            alarm_tx,
            alarm_rx,
            started,
            failed_polls: AtomicU64::new(0),
            under_test_log: Mutex::new(String::new()),
            cfg,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn site(&self) -> &str {
        &self.cfg.site.name
    }

    pub fn identity(&self) -> Identity {
        *self.identity.read()
    }

    pub fn defaults(&self) -> ModelDefaults {
        self.defaults.read().clone()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn feedback(&self) -> &FeedbackRecorder {
        &self.feedback
    }

    pub fn power_log(&self) -> &PowerLog {
        &self.power_log
    }

    pub fn alarm_signals(&self) -> &Receiver<()> {
        &self.alarm_rx
    }

    pub fn is_initialized(&self) -> bool {
        self.init_complete.load(Ordering::Acquire)
    }

    pub fn comm_active(&self) -> bool {
        self.comm_active.load(Ordering::Relaxed)
    }

    pub fn set_comm_active(&self, active: bool) {
        self.comm_active.store(active, Ordering::Relaxed);
    }

    pub fn failed_polls(&self) -> u64 {
        self.failed_polls.load(Ordering::Relaxed)
    }

    pub fn link_stats(&self) -> TransportStats {
        self.link.lock().borrow().stats()
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.read().stats()
    }

    pub fn run_time(&self) -> TimeDelta {
        self.clock.wall() - self.started
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&RegisterStore) -> R) -> R {
        f(&self.store.read())
    }

    /// Run `f` over a consistent copy of the registers.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&Snapshot<'_>) -> R) -> R {
        let regs = self.store.read().snapshot();
        let defaults = self.defaults.read().clone();
        let s = Snapshot {
            regs,
            id: self.identity(),
            catalog: &self.catalog,
            defaults: &defaults,
            enhanced_exercise: self.cfg.controller.enhanced_exercise,
            display_unknown: self.cfg.monitor.display_unknown,
        };
        f(&s)
    }

    /// One transaction under the link lock.
    fn transact<R>(
        &self,
        f: impl FnOnce(&mut dyn Transport) -> Result<R, BoxError>,
    ) -> Result<R, GenmonError> {
        let guard = self.link.lock();
        let mut link = guard.borrow_mut();
        f(&mut **link).map_err(|e| map_transport_error(e.as_ref()))
    }

    /// Read without touching the store.
    pub fn read_registers(&self, address: u16, words: u16) -> Result<String, GenmonError> {
        self.transact(|t| t.read_registers(address, words, self.timeout))
            .inspect_err(|e| {
                self.failed_polls.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(reg = %registers::reg_name(address), error = %e, "register read failed");
            })
    }

    /// Perform `writes` in order while holding the link for the whole sequence.
    pub fn write_sequence(&self, writes: &[RegisterWrite]) -> Result<(), GenmonError> {
        let _held = self.link.lock();
        for w in writes {
            self.transact(|t| t.write_registers(w.address, w.words(), &w.data, self.timeout))
                .inspect_err(|e| {
                    tracing::error!(reg = %registers::reg_name(w.address), error = %e, "register write failed");
                })?;
        }
        Ok(())
    }

    /// Release the controller link. Later transactions fail until the
    /// device is replaced; the last counters stay readable.
    pub fn close_link(&self) {
        let guard = self.link.lock();
        let stats = guard.borrow().stats();
        drop(guard.replace(Box::new(ClosedLink { stats })));
        tracing::debug!("controller link closed");
    }

    pub fn flush_link(&self) {
        if let Err(e) = self.transact(|t| t.flush()) {
            tracing::warn!(error = %e, "link flush failed");
        }
    }

    /// Store a value read from the controller and raise what its change implies.
    pub fn ingest(&self, address: u16, raw: &str) {
        let outcome = self.store.write().update(address, raw);
        match outcome {
            UpdateOutcome::Rejected { expected, actual } => tracing::warn!(
                reg = %registers::reg_name(address),
                expected,
                actual,
                "validation error: register value has the wrong length"
            ),
            UpdateOutcome::Unknown => {
                tracing::debug!(reg = %registers::reg_name(address), "value for unknown register ignored");
            }
            UpdateOutcome::Changed(c) if c.kind == ChangeKind::UnderTest => self.note_under_test(&c),
            UpdateOutcome::Changed(c) if c.notifies() => self.notify_change(&c),
            _ => {}
        }
    }

    fn note_under_test(&self, c: &Change) {
        let engine = self.with_store(decode::engine_text);
        let line = format!(
            "Reg {} changed from {} to {}, Bits Changed: {}, Mask: {:x}, Engine State: {}\n",
            registers::reg_name(c.address),
            c.old,
            c.new,
            c.bits_changed(),
            c.mask(),
            engine
        );
        tracing::debug!(reg = %registers::reg_name(c.address), old = %c.old, new = %c.new, "register under test changed");
        self.under_test_log.lock().push_str(&line);
    }

    /// Drain the batch of under-test changes collected so far.
    pub fn take_under_test_log(&self) -> String {
        std::mem::take(&mut *self.under_test_log.lock())
    }

    fn notify_change(&self, c: &Change) {
        let name = registers::reg_name(c.address);
        let (regs, state) = self.with_snapshot(|s| {
            let now = self.clock.wall();
            (
                status::registers_report(s, self.store_stats(), false).to_text(),
                status::status_report(s, &self.outage.lock(), now).to_text(),
            )
        });
        let body = format!("{name} changed from {} to {}\n{regs}\n{state}", c.old, c.new);
        self.notifier
            .send(&format!("{REGISTER_ALERT_SUBJECT}{name}"), &body, Category::Register);
    }

    /// Record a feedback report with a register dump attached.
    pub fn record_feedback(&self, reason: &str, message: Option<&str>, all_registers: bool) {
        self.feedback.record(reason, message, || {
            self.with_snapshot(|s| {
                format!(
                    "\n{}",
                    status::registers_report(s, self.store_stats(), all_registers).to_text()
                )
            })
        });
    }

    /// Identify the controller and prime the store. Run once per connection.
    pub fn initialize(&self) -> SweepReport {
        self.init_complete.store(false, Ordering::Release);
        self.flush_link();
        let mut report = SweepReport::default();
        report.record(self.poll(MODEL_REG, MODEL_WORDS));
        report.record(self.detect_controller());

        let evolution = self.identity().evolution;
        for (address, words) in scheduler::log_heads(evolution) {
            report.record(self.poll(address, words));
        }
        report.merge(scheduler::poll_primes(self));
        for &address in BASE_REGISTERS {
            report.record(self.poll(address, 1));
        }
        self.resolve_defaults();

        self.init_complete.store(true, Ordering::Release);
        self.alarm_check_due();
        if report.all_failed() {
            tracing::warn!(
                requests = report.requests,
                "controller did not answer any start-up request"
            );
        } else {
            tracing::info!(
                controller = %self.identity().configured_name(),
                requests = report.requests,
                failures = report.failures,
                "controller initialized"
            );
        }
        report
    }

    fn detect_controller(&self) -> Result<(), GenmonError> {
        let polled = self.poll(CONTROLLER_REG, 1);
        let code = self.with_store(|v| decode::reg_u16(v, CONTROLLER_REG));
        let c = &self.cfg.controller;
        let d = identity::detect(code, c.evolution, c.liquid_cooled, self.site());
        for w in &d.warnings {
            self.notifier.send(&w.subject, &w.body, Category::Warning);
        }
        *self.identity.write() = d.identity;
        self.store.write().set_evolution(d.identity.evolution);
        self.legacy_write
            .store(c.legacy_write || d.force_legacy_write, Ordering::Relaxed);
        polled
    }

    fn resolve_defaults(&self) {
        let id = self.identity();
        let r = self.with_store(|v| identity::resolve_defaults(id, v, &self.cfg.controller));
        *self.defaults.write() = r.defaults;
        if r.model_id_unknown {
            let value = self.with_store(|s| s.get(MODEL_REG)).unwrap_or_default();
            self.record_feedback(
                "ModelID",
                Some(&format!("Model ID register is unknown: {value}")),
                false,
            );
        }
    }

    /// Compare status against the last check and announce any change.
    pub fn check_alarms(&self) {
        if !self.is_initialized() {
            return;
        }
        if !self.cfg.monitor.disable_outage_check {
            self.check_outage();
        }

        let Some(status) = self.with_store(decode::status_u32) else {
            return;
        };
        {
            let mut last = self.last_status.lock();
            if *last == Some(status) {
                return;
            }
            *last = Some(status);
        }

        let id = self.identity();
        if self.cfg.monitor.poll_logs {
            scheduler::reread_logs(self, LogWindow::for_family(id.evolution));
        }
        let status_hex = format!("Reg {} = {status:08x}", registers::reg_name(STATUS_REG));

        if let EngineState::Unknown(_) = EngineState::from_status(status) {
            self.record_feedback("EngineState", Some(&status_hex), false);
        }
        let alarm = self.with_store(|v| decode::alarm_state(v, id, &self.catalog));
        if let Some(AlarmState::Unknown(_)) = alarm {
            self.record_feedback("Alarm", Some(&status_hex), false);
        }
        let logs_unknown = self.with_snapshot(|s| status::logs_report(s).unknown_found);
        if logs_unknown {
            self.record_feedback("Logs", None, true);
        }

        let (subject, body) = self.with_snapshot(|s| status::alarm_notice(s, self.site(), status));
        tracing::info!(status = %format!("{status:08x}"), "controller status changed");
        self.notifier.send(&subject, &body, Category::Warning);
    }

    fn check_outage(&self) {
        let id = self.identity();
        let reading = self.with_store(|v| {
            Some(LineReading {
                utility: decode::reg_u16(v, 0x0009)?,
                threshold: decode::reg_u16(v, 0x0011).unwrap_or(0),
                pickup: if id.is_evo_lc() {
                    decode::reg_u16(v, 0x023b).unwrap_or(0)
                } else {
                    0
                },
                transfer: decode::transfer_state(v, id),
            })
        });
        let Some(reading) = reading else {
            return;
        };
        let events = self.outage.lock().observe(reading, self.clock.wall());
        for event in events {
            if let (Some(line), Some(path)) = (event.log_line(), &self.cfg.paths.outage_log)
                && let Err(e) = applog::append_line(path, &line)
            {
                tracing::error!(path = %path.display(), error = %e, "append outage log");
            }
            tracing::info!(event = ?event, "utility line event");
            self.notifier.send(
                &format!("{}{}", event.subject(), self.site()),
                &event.body(),
                Category::Alert,
            );
        }
    }

    /// Append a power sample when output changed since `last`.
    ///
    /// Leaving zero also logs the zero one second earlier so the rise shows
    /// as a step rather than a ramp from the previous entry.
    pub fn sample_power(&self, last: &mut f64) {
        if !self.power_log.enabled() || !self.is_initialized() {
            return;
        }
        let id = self.identity();
        let Some(kw) = self.with_store(|v| decode::power_kw(v, id)) else {
            return;
        };
        if (*last - kw).abs() < f64::EPSILON {
            return;
        }
        let now = self.clock.wall();
        let mut samples = Vec::with_capacity(2);
        if *last == 0.0 {
            samples.push(PowerSample::new(now - TimeDelta::seconds(1), 0.0));
        }
        samples.push(PowerSample::new(now, kw));
        *last = kw;
        for s in samples {
            if let Err(e) = self.power_log.append(s) {
                tracing::error!(error = %e, "append power log");
            }
        }
    }

    pub fn prune_power_log(&self) {
        let out = self
            .power_log
            .prune(self.cfg.power.prune_minutes, self.clock.wall());
        if out.size_warning {
            self.notifier
                .send(SIZE_WARNING_SUBJECT, SIZE_WARNING_BODY, Category::Warning);
        }
        tracing::info!(result = %out.message, "power log pruned");
    }

    pub fn set_remote(&self, item: &str) -> String {
        let cmd = match commands::parse_setremote(item) {
            Ok(c) => c,
            Err(reply) => return reply.to_string(),
        };
        tracing::info!(command = ?cmd, "remote command");
        match self.write_sequence(&commands::remote_writes(cmd)) {
            Ok(()) => commands::REMOTE_SENT.to_string(),
            Err(e) => format!("Error sending remote command: {e}"),
        }
    }

    pub fn set_quiet(&self, item: &str) -> String {
        let on = match commands::parse_setquiet(item) {
            Ok(on) => on,
            Err(reply) => return reply.to_string(),
        };
        match self.write_sequence(&commands::quiet_writes(on)) {
            Ok(()) => commands::QUIET_SENT.to_string(),
            Err(e) => format!("Error setting quiet mode: {e}"),
        }
    }

    pub fn set_exercise(&self, item: &str) -> String {
        if self.legacy_write.load(Ordering::Relaxed) {
            return self.set_exercise_legacy(item);
        }
        let req = match commands::parse_setexercise(item, WeekStart::Sunday) {
            Ok(r) => r,
            Err(reply) => return reply.to_string(),
        };
        let writes = match commands::exercise_writes(req, self.cfg.controller.enhanced_exercise) {
            Ok(w) => w,
            Err(reply) => return reply.to_string(),
        };
        match self.write_sequence(&writes) {
            Ok(()) => commands::EXERCISE_SENT.to_string(),
            Err(e) => format!("Error setting exercise time: {e}"),
        }
    }

    fn set_exercise_legacy(&self, item: &str) -> String {
        let req = match commands::parse_setexercise(item, WeekStart::Monday) {
            Ok(r) if r.mode == ExerciseMode::Weekly => r,
            Ok(_) => return commands::SETEXERCISE_SYNTAX.to_string(),
            Err(reply) => return reply.to_string(),
        };
        let Some(now) = self
            .with_store(decode::generator_clock)
            .and_then(decode::GeneratorClock::to_datetime)
        else {
            return "Error reading generator time".to_string();
        };
        let Some(minutes) = commands::legacy_minutes(now, req) else {
            return commands::SETEXERCISE_SYNTAX.to_string();
        };
        let value = commands::calculate_exercise_time(minutes);
        tracing::debug!(minutes, value = %format!("{value:04x}"), "legacy exercise encoding");
        match self.write_sequence(&commands::legacy_exercise_writes(value)) {
            Ok(()) => commands::EXERCISE_LEGACY_SENT.to_string(),
            Err(e) => format!("Error setting exercise time: {e}"),
        }
    }

    /// Wait for the top of the minute, then write the wall clock.
    pub fn set_generator_time(&self) -> Result<(), GenmonError> {
        let waited_from = self.clock.now();
        let mut now = self.clock.wall();
        while now.second() != 0 && self.clock.now() - waited_from < SET_TIME_WAIT {
            self.clock.sleep(Duration::from_millis(250));
            now = self.clock.wall();
        }
        tracing::info!(time = %now.format("%Y-%m-%d %H:%M:%S"), "setting generator time");
        self.write_sequence(&[commands::clock_write(now)])
    }

    /// `getregvalue`: the cached value.
    pub fn cached_value(&self, item: &str) -> String {
        let reg = match commands::parse_reg_query(item, Verb::GetRegValue) {
            Ok(r) => r,
            Err(reply) => return reply.to_string(),
        };
        registers::parse_reg_name(reg)
            .and_then(|a| self.with_store(|s| s.get(a)))
            .unwrap_or_else(|| commands::unsupported_register(reg))
    }

    /// `readregvalue`: a live one-word read that bypasses the store.
    pub fn live_value(&self, item: &str) -> String {
        let reg = match commands::parse_reg_query(item, Verb::ReadRegValue) {
            Ok(r) => r,
            Err(reply) => return reply.to_string(),
        };
        registers::parse_reg_name(reg)
            .and_then(|a| self.read_registers(a, 1).ok())
            .unwrap_or_else(|| commands::unsupported_register(reg))
    }

    pub fn status_node(&self) -> Node {
        let now = self.clock.wall();
        self.with_snapshot(|s| status::status_report(s, &self.outage.lock(), now))
    }

    pub fn maintenance_node(&self) -> Node {
        self.with_snapshot(status::maintenance_report)
    }

    pub fn outage_node(&self) -> Node {
        let history = match &self.cfg.paths.outage_log {
            Some(path) => applog::read_or_empty(path)
                .map(|c| history_lines(&c))
                .unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "read outage log");
                    Vec::new()
                }),
            None => Vec::new(),
        };
        self.with_snapshot(|s| status::outage_report(s, &self.outage.lock(), history))
    }

    pub fn registers_node(&self, all: bool) -> Node {
        let stats = self.store_stats();
        self.with_snapshot(|s| status::registers_report(s, stats, all))
    }

    pub fn logs_node(&self) -> Node {
        let listing = self.with_snapshot(status::logs_report);
        if listing.unknown_found {
            self.record_feedback("Logs", None, true);
        }
        listing.node
    }

    pub fn monitor_node(&self, health: String) -> Node {
        status::monitor_report(&MonitorFacts {
            health,
            controller: self.identity().configured_name(),
            run_time: self.run_time(),
            link: self.link_stats(),
            failed_polls: self.failed_polls(),
        })
    }

    pub fn gui_status_node(&self) -> Node {
        let unsent = self.feedback.has_unsent();
        self.with_snapshot(|s| status::gui_status(s, unsent))
    }

    pub fn start_info_node(&self) -> Node {
        status::start_info(self.site(), self.identity(), &self.defaults.read())
    }

    pub fn base_status(&self) -> String {
        let id = self.identity();
        self.with_store(|v| decode::base_status(v, id)).to_string()
    }

    pub fn exercise_text(&self) -> String {
        let enhanced = self.cfg.controller.enhanced_exercise;
        self.with_store(|v| decode::parsed_exercise_time(v, enhanced))
    }

    pub fn in_alarm(&self) -> bool {
        self.with_store(decode::in_alarm)
    }

    /// `<switch>, <engine>` for the connection greeting.
    pub fn state_line(&self) -> String {
        self.with_store(|v| format!("{}, {}", decode::switch_text(v), decode::engine_text(v)))
    }
}

impl Poll for Device {
    fn poll(&self, address: u16, words: u16) -> Result<(), GenmonError> {
        let raw = self.read_registers(address, words)?;
        self.ingest(address, &raw);
        Ok(())
    }

    fn alarm_check_due(&self) {
        // a pending signal already covers this one
        let _ = self.alarm_tx.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingNotifier;
    use chrono::NaiveDate;
    use genmon_hardware::{SimHandle, SimulatedController};
    use genmon_traits::clock::test_clock::TestClock;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 17)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    fn device(cfg: Config) -> (Device, SimHandle, Arc<RecordingNotifier>, TestClock) {
        let sim = SimulatedController::preset(0x09);
        let handle = sim.handle();
        let notes = Arc::new(RecordingNotifier::default());
        let clock = TestClock::at(at(12, 0, 0));
        let dev = Device::new(
            cfg,
            Box::new(sim),
            AlarmCatalog::default(),
            notes.clone(),
            Arc::new(clock.clone()),
        );
        (dev, handle, notes, clock)
    }

    fn config() -> (Config, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.site.name = "Barn".to_string();
        cfg.paths.feedback_file = dir.path().join("feedback.json");
        cfg.paths.outage_log = Some(dir.path().join("outage.txt"));
        (cfg, dir)
    }

    #[test]
    fn initialize_detects_and_primes() {
        let (cfg, _dir) = config();
        let (dev, _sim, _notes, _clock) = device(cfg);
        let report = dev.initialize();
        assert!(!report.all_failed());
        assert!(report.requests > BASE_REGISTERS.len());
        assert!(dev.is_initialized());
        assert!(dev.identity().evolution);
        assert!(dev.with_store(|s| s.get(STATUS_REG)).is_some());
        assert!(dev.alarm_signals().try_recv().is_ok());
    }

    #[test]
    fn silent_controller_is_reported_by_initialize() {
        let (cfg, _dir) = config();
        let (dev, sim, _notes, _clock) = device(cfg);
        sim.set_offline(true);
        let report = dev.initialize();
        assert!(report.all_failed());
        assert_eq!(report.failures, report.requests);
    }

    #[test]
    fn wrong_length_value_is_not_stored() {
        let (cfg, _dir) = config();
        let (dev, _sim, _notes, _clock) = device(cfg);
        dev.ingest(0x0005, "12");
        assert_eq!(dev.with_store(|s| s.get(0x0005)), None);
        dev.ingest(0x0005, "0012");
        assert_eq!(dev.with_store(|s| s.get(0x0005)).as_deref(), Some("0012"));
    }

    #[test]
    fn status_change_sends_one_notice() {
        let (cfg, _dir) = config();
        let (dev, sim, notes, _clock) = device(cfg);
        dev.initialize();
        let warnings = || notes.sent().iter().filter(|n| n.category == Category::Warning).count();
        dev.check_alarms();
        assert_eq!(warnings(), 1);
        dev.check_alarms();
        assert_eq!(warnings(), 1);

        sim.set_words(0x0001, &[0x0003, 0x0000]);
        dev.poll(0x0001, 2).unwrap();
        dev.check_alarms();
        assert_eq!(warnings(), 2);
    }

    #[test]
    fn outage_is_logged_and_announced() {
        let (cfg, dir) = config();
        let (dev, _sim, notes, clock) = device(cfg);
        dev.initialize();
        for (volts, secs) in [(240, 0), (100, 5), (100, 60), (240, 30)] {
            clock.advance(Duration::from_secs(secs));
            dev.ingest(0x0009, &format!("{volts:04x}"));
            dev.check_alarms();
        }
        assert_eq!(notes.with_subject("Outage Notice at Barn").len(), 1);
        assert_eq!(notes.with_subject("Outage Recovery Notice at Barn").len(), 1);
        let log = std::fs::read_to_string(dir.path().join("outage.txt")).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.ends_with("0:01:30\n"));
    }

    #[test]
    fn leaving_zero_logs_a_step() {
        let (mut cfg, dir) = config();
        let path = dir.path().join("kwlog.txt");
        cfg.paths.power_log = Some(path.clone());
        let (dev, _sim, _notes, clock) = device(cfg);
        dev.initialize();

        let mut last = 0.0;
        dev.ingest(0x0001, "00000000");
        dev.sample_power(&mut last);
        assert!(!path.exists());

        clock.advance(Duration::from_secs(10));
        let rise = clock.wall();
        for (address, value) in [(0x0001, "00030000"), (0x0012, "00f0"), (0x05f4, "000a"), (0x05f5, "0005")] {
            dev.ingest(address, value);
        }
        dev.sample_power(&mut last);
        assert!((last - 3.6).abs() < 1e-9);

        clock.advance(Duration::from_secs(10));
        dev.ingest(0x05f5, "0006");
        dev.sample_power(&mut last);

        let log = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 3, "{log}");
        let stamp = |t: NaiveDateTime| t.format(crate::power::POWER_TIME_FORMAT).to_string();
        assert_eq!(lines[0], format!("{},0.0", stamp(rise - TimeDelta::seconds(1))));
        assert_eq!(lines[1], format!("{},3.6", stamp(rise)));
        assert!(lines[2].ends_with(",3.84"), "{log}");
    }

    #[test]
    fn remote_start_writes_value_then_index() {
        let (cfg, _dir) = config();
        let (dev, sim, _notes, _clock) = device(cfg);
        assert_eq!(dev.set_remote("setremote=start"), commands::REMOTE_SENT);
        let writes = sim.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].address, 0x0004);
        assert_eq!((writes[1].address, writes[1].data.clone()), (0x0003, vec![0, 1]));
        assert_eq!(dev.set_remote("setremote=jump"), commands::SETREMOTE_UNKNOWN);
    }

    #[test]
    fn clock_write_waits_for_minute() {
        let (cfg, _dir) = config();
        let (dev, sim, _notes, clock) = device(cfg);
        clock.advance(Duration::from_secs(45));
        dev.set_generator_time().unwrap();
        let writes = sim.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].address, 0x000e);
        assert_eq!(writes[0].data[..2], [12, 1]);
    }

    #[test]
    fn register_queries() {
        let (cfg, _dir) = config();
        let (dev, sim, _notes, _clock) = device(cfg);
        assert_eq!(dev.cached_value("getregvalue=0005"), "Unsupported Register: 0005");
        sim.set_word(0x0005, 0x0102);
        assert_eq!(dev.live_value("readregvalue=0005"), "0102");
        assert_eq!(dev.with_store(|s| s.get(0x0005)), None);
        dev.poll(0x0005, 1).unwrap();
        assert_eq!(dev.cached_value("getregvalue=0005"), "0102");
    }
}
