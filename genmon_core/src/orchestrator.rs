//! Monitor lifecycle: the loops, command dispatch, health and reload.
//!
//! ## Loops
//! - `process`: initialise, then sweep the register tables forever
//! - `alarm`: runs [`Device::check_alarms`] whenever a sweep signals it
//! - `watchdog`: marks the link active while rx packets keep arriving
//! - `power`: appends changed output readings to the power log
//! - `timesync`: keeps the controller clock on wall time (optional)
//! - `debug`: mails the under-test register batch (optional)
//!
//! Every loop holds an `Arc<Device>` taken at spawn time. Reload stops the
//! loops, builds a fresh device and starts them again.

use crate::commands::{self, Resolved, Verb};
use crate::device::{Device, SharedClock};
use crate::power::PowerSample;
use crate::registers::BASE_REGISTERS;
use crate::report::Node;
use crate::scheduler;
use crate::worker::{Worker, pause, stopped};
use chrono::{Local, Offset, TimeZone};
use crossbeam_channel::RecvTimeoutError;
use genmon_config::{AlarmCatalog, Config, load_alarm_catalog};
use genmon_traits::{Category, Notifier, Transport};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

const WATCHDOG_PERIOD: Duration = Duration::from_secs(2);
const TIME_SYNC_PERIOD: Duration = Duration::from_secs(3600);
const UNDER_TEST_PERIOD: Duration = Duration::from_secs(600);
const POWER_PRUNE_PERIOD: Duration = Duration::from_secs(24 * 3600);
/// Back-off after a sweep in which nothing answered.
const NO_RESPONSE_PAUSE: Duration = Duration::from_secs(1);

pub const RELOAD_REPLY: &str = "Genmon reloaded";
pub const RELOAD_CONFIG_ERROR: &str = "Error reloading, error reading config file";
pub const RELOAD_LINK_ERROR: &str = "Failed to reload serial port.";

/// Opens the controller link for a configuration.
pub trait TransportFactory: Send + Sync {
    fn open(&self, cfg: &Config) -> eyre::Result<Box<dyn Transport>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&Config) -> eyre::Result<Box<dyn Transport>> + Send + Sync,
{
    fn open(&self, cfg: &Config) -> eyre::Result<Box<dyn Transport>> {
        self(cfg)
    }
}

/// Produces the configuration again on reload.
pub type ConfigSource = Box<dyn Fn() -> eyre::Result<Config> + Send + Sync>;

pub struct Monitor {
    device: RwLock<Arc<Device>>,
    workers: Mutex<Vec<Worker>>,
    factory: Box<dyn TransportFactory>,
    config_source: ConfigSource,
    notifier: Arc<dyn Notifier>,
    clock: SharedClock,
}

fn alarm_catalog(cfg: &Config) -> AlarmCatalog {
    let Some(path) = &cfg.paths.alarm_file else {
        return AlarmCatalog::default();
    };
    match load_alarm_catalog(path) {
        Ok(c) => {
            tracing::info!(path = %path.display(), entries = c.len(), "alarm catalog loaded");
            c
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "alarm catalog unavailable");
            AlarmCatalog::default()
        }
    }
}

impl Monitor {
    /// Open the link and start every loop.
    pub fn start(
        cfg: Config,
        factory: Box<dyn TransportFactory>,
        config_source: ConfigSource,
        notifier: Arc<dyn Notifier>,
        clock: SharedClock,
    ) -> eyre::Result<Arc<Self>> {
        let transport = factory.open(&cfg)?;
        let site = cfg.site.name.clone();
        let device = Arc::new(Device::new(
            cfg.clone(),
            transport,
            alarm_catalog(&cfg),
            notifier.clone(),
            clock.clone(),
        ));
        device.feedback().flush_outstanding();
        let start = format!("Generator Monitor Starting at {site}");
        notifier.send(&start, &start, Category::Info);

        let monitor = Arc::new(Self {
            device: RwLock::new(device.clone()),
            workers: Mutex::new(Vec::new()),
            factory,
            config_source,
            notifier,
            clock,
        });
        *monitor.workers.lock() = spawn_loops(&device)?;
        tracing::info!(site = %site, "monitor started");
        Ok(monitor)
    }

    pub fn device(&self) -> Arc<Device> {
        self.device.read().clone()
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn site(&self) -> String {
        self.device().site().to_string()
    }

    fn threads_alive(&self) -> bool {
        let workers = self.workers.lock();
        !workers.is_empty() && workers.iter().all(Worker::is_alive)
    }

    /// `OK`, or the list of problems.
    pub fn health(&self) -> String {
        let dev = self.device();
        let mut out = String::new();
        if !dev.is_initialized() {
            out.push_str("System Initializing. ");
        }
        if !self.threads_alive() {
            out.push_str(" Threads are dead. ");
        }
        if !dev.comm_active() {
            out.push_str(" Not receiving data. ");
        }
        if out.is_empty() {
            out.push_str("OK");
        }
        out
    }

    /// Names of loops that have stopped running, or `None`.
    pub fn dead_loops(&self) -> String {
        let dead: String = self
            .workers
            .lock()
            .iter()
            .filter(|w| !w.is_alive())
            .map(|w| format!("{} ", w.name()))
            .collect();
        if dead.is_empty() {
            "None".to_string()
        } else {
            dead
        }
    }

    /// Connection greeting for the command server.
    pub fn greeting(&self) -> String {
        let dev = self.device();
        let health = self.health();
        let lead = if dev.in_alarm() {
            "CRITICAL: System in alarm! ".to_string()
        } else if health != "OK" {
            format!("WARNING: {health}")
        } else {
            "OK ".to_string()
        };
        format!("{lead}: {}", dev.state_line())
    }

    /// Run a `generator: ...` command line.
    ///
    /// Socket replies end with the end-of-message sentinel. Other channels
    /// get the reply as a notice as well.
    pub fn process_command(&self, command: &str, from_socket: bool) -> String {
        let site = self.site();
        let items = match commands::split_items(command) {
            Ok(items) => items,
            Err(rejection) => {
                tracing::info!(reason = rejection.subject(), "command rejected");
                if from_socket {
                    return format!("{}{}", rejection.reply(), commands::END_OF_MESSAGE);
                }
                let body = format!("\n{}", rejection.reply());
                self.notifier.send(rejection.subject(), &body, Category::Warning);
                return body;
            }
        };

        let mut body = if from_socket { String::new() } else { "\n".to_string() };
        for item in &items {
            match commands::resolve(item, from_socket) {
                Resolved::Verb(verb) => {
                    let reply = self.run_verb(verb, item);
                    if verb.replaces_body() {
                        body = reply;
                    } else {
                        body.push_str(&reply);
                    }
                }
                Resolved::WrongChannel => {
                    tracing::debug!(item = %item, "socket-only command ignored");
                }
                Resolved::Unknown => body.push_str(&commands::invalid_item_reply(item)),
            }
            if !from_socket {
                body.push_str("\n\n");
            }
        }

        if from_socket {
            body.push_str(commands::END_OF_MESSAGE);
        } else {
            self.notifier.send(
                &format!("Generator Command Response at {site}"),
                &body,
                Category::Warning,
            );
        }
        body
    }

    fn run_verb(&self, verb: Verb, item: &str) -> String {
        let dev = self.device();
        tracing::debug!(?verb, "command");
        match verb {
            Verb::Registers => dev.registers_node(false).to_text(),
            Verb::AllRegs => dev.registers_node(true).to_text(),
            Verb::Logs => dev.logs_node().to_text(),
            Verb::Status => dev.status_node().to_text(),
            Verb::Maint => dev.maintenance_node().to_text(),
            Verb::Monitor => dev.monitor_node(self.health()).to_text(),
            Verb::Outage => dev.outage_node().to_text(),
            Verb::SetTime => {
                spawn_set_time(dev);
                commands::TIME_SET_SENT.to_string()
            }
            Verb::SetExercise => dev.set_exercise(item),
            Verb::SetQuiet => dev.set_quiet(item),
            Verb::Help => format!(
                "Help:\n{}",
                commands::help_text(dev.config().controller.enhanced_exercise)
            ),
            Verb::SetRemote => dev.set_remote(item),
            Verb::PowerLogJson => dev.power_log().history(item, self.clock.wall()).to_reply(),
            Verb::PowerLogClear => dev.power_log().clear(self.clock.wall()),
            Verb::StartInfoJson => dev.start_info_node().to_json(),
            Verb::RegistersJson => dev.registers_node(false).to_json(),
            Verb::AllRegsJson => dev.registers_node(true).to_json(),
            Verb::LogsJson => dev.logs_node().to_json(),
            Verb::StatusJson => dev.status_node().to_json(),
            Verb::MaintJson => dev.maintenance_node().to_json(),
            Verb::MonitorJson => dev.monitor_node(self.health()).to_json(),
            Verb::OutageJson => dev.outage_node().to_json(),
            Verb::GuiStatusJson => dev.gui_status_node().to_json(),
            Verb::GetSiteName => dev.site().to_string(),
            Verb::GetBase => dev.base_status(),
            Verb::GetHealth => self.health(),
            Verb::GetExercise => dev.exercise_text(),
            Verb::GetRegValue => dev.cached_value(item),
            Verb::ReadRegValue => dev.live_value(item),
            Verb::GetDebug => self.dead_loops(),
            Verb::Reload => self.reload(),
        }
    }

    /// Stop the loops, re-read the configuration, reopen the link and start
    /// over with a fresh device.
    pub fn reload(&self) -> String {
        tracing::info!("reload requested");
        let mut workers = self.workers.lock();
        workers.clear();

        let cfg = match (self.config_source)() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!(error = %e, "reload: config");
                return RELOAD_CONFIG_ERROR.to_string();
            }
        };
        // the old link must be gone before an exclusive port can reopen
        self.device().close_link();
        let transport = match self.factory.open(&cfg) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "reload: link");
                return RELOAD_LINK_ERROR.to_string();
            }
        };
        let site = cfg.site.name.clone();
        let device = Arc::new(Device::new(
            cfg.clone(),
            transport,
            alarm_catalog(&cfg),
            self.notifier.clone(),
            self.clock.clone(),
        ));
        *self.device.write() = device.clone();

        let notice = format!("Generator Monitor Reload at {site}");
        self.notifier.send(&notice, &notice, Category::Info);
        match spawn_loops(&device) {
            Ok(w) => *workers = w,
            Err(e) => {
                tracing::error!(error = %e, "reload: spawn loops");
                return format!("Error reloading: {e}");
            }
        }
        tracing::info!("reload complete");
        RELOAD_REPLY.to_string()
    }

    /// Stop every loop and announce it.
    pub fn shutdown(&self) {
        let site = self.site();
        let notice = format!("Generator Monitor Stopping at {site}");
        self.notifier.send(&notice, &notice, Category::Info);
        let mut workers = self.workers.lock();
        for w in workers.iter() {
            w.signal_stop();
        }
        workers.clear();
        tracing::info!("monitor stopped");
    }

    /// Report tree for `verb`, used by the one-shot query surface.
    pub fn report(&self, verb: Verb) -> Option<Node> {
        let dev = self.device();
        Some(match verb {
            Verb::Registers | Verb::RegistersJson => dev.registers_node(false),
            Verb::AllRegs | Verb::AllRegsJson => dev.registers_node(true),
            Verb::Logs | Verb::LogsJson => dev.logs_node(),
            Verb::Status | Verb::StatusJson => dev.status_node(),
            Verb::Maint | Verb::MaintJson => dev.maintenance_node(),
            Verb::Monitor | Verb::MonitorJson => dev.monitor_node(self.health()),
            Verb::Outage | Verb::OutageJson => dev.outage_node(),
            Verb::GuiStatusJson => dev.gui_status_node(),
            Verb::StartInfoJson => dev.start_info_node(),
            _ => return None,
        })
    }
}

fn spawn_loops(dev: &Arc<Device>) -> std::io::Result<Vec<Worker>> {
    let monitor = &dev.config().monitor;
    let mut workers = Vec::new();

    let d = dev.clone();
    workers.push(Worker::spawn("process", move |stop| process_loop(&d, &stop))?);
    let d = dev.clone();
    workers.push(Worker::spawn("alarm", move |stop| alarm_loop(&d, &stop))?);
    let d = dev.clone();
    workers.push(Worker::spawn("watchdog", move |stop| watchdog_loop(&d, &stop))?);
    let d = dev.clone();
    workers.push(Worker::spawn("power", move |stop| power_loop(&d, &stop))?);
    if monitor.sync_time || monitor.sync_dst {
        let d = dev.clone();
        workers.push(Worker::spawn("timesync", move |stop| time_sync_loop(&d, &stop))?);
    }
    if monitor.debug_scan {
        let d = dev.clone();
        workers.push(Worker::spawn("debug", move |stop| under_test_loop(&d, &stop))?);
    }
    Ok(workers)
}

fn process_loop(dev: &Device, stop: &AtomicBool) {
    dev.initialize();
    let debug = dev.config().monitor.debug_scan;
    while !stopped(stop) {
        let report = scheduler::sweep(dev, BASE_REGISTERS);
        if debug {
            scheduler::debug_scan(dev, dev.identity().evolution);
        }
        if report.all_failed() {
            tracing::warn!(requests = report.requests, "no response from controller");
            if !pause(dev.clock(), stop, NO_RESPONSE_PAUSE) {
                break;
            }
        }
    }
}

fn alarm_loop(dev: &Device, stop: &AtomicBool) {
    while !stopped(stop) {
        match dev.alarm_signals().recv_timeout(crate::worker::STOP_POLL) {
            Ok(()) => dev.check_alarms(),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn watchdog_loop(dev: &Device, stop: &AtomicBool) {
    dev.set_comm_active(false);
    let mut last_rx = dev.link_stats().rx_packets;
    loop {
        let rx = dev.link_stats().rx_packets;
        dev.set_comm_active(rx != last_rx);
        last_rx = rx;
        if !pause(dev.clock(), stop, WATCHDOG_PERIOD) {
            break;
        }
    }
}

fn wait_for_init(dev: &Device, stop: &AtomicBool) -> bool {
    while !dev.is_initialized() {
        if !pause(dev.clock(), stop, Duration::from_secs(1)) {
            return false;
        }
    }
    true
}

/// Park until stopped. Used by loops with nothing to do on this controller.
fn idle(dev: &Device, stop: &AtomicBool) {
    while pause(dev.clock(), stop, Duration::from_secs(60)) {}
}

fn power_loop(dev: &Device, stop: &AtomicBool) {
    if !dev.power_log().enabled() {
        tracing::info!("power log disabled");
        return idle(dev, stop);
    }
    if !wait_for_init(dev, stop) {
        return;
    }
    let id = dev.identity();
    if !id.evolution || (!id.liquid_cooled && !dev.config().monitor.display_unknown) {
        tracing::info!(controller = %id.configured_name(), "power log not supported");
        return idle(dev, stop);
    }
    tracing::info!("power log started");
    if dev.power_log().is_empty()
        && let Err(e) = dev.power_log().append(PowerSample::new(dev.clock().wall(), 0.0))
    {
        tracing::error!(error = %e, "power log start marker");
    }

    let period = Duration::from_secs(dev.config().power.sample_secs.max(1));
    let mut last = 0.0;
    let mut since_prune = Duration::ZERO;
    while pause(dev.clock(), stop, period) {
        since_prune += period;
        if since_prune >= POWER_PRUNE_PERIOD {
            dev.prune_power_log();
            since_prune = Duration::ZERO;
        }
        dev.sample_power(&mut last);
    }
}

/// Daylight saving time is in effect when the local offset is ahead of the
/// smaller of the January and July offsets.
pub fn is_dst() -> bool {
    use chrono::Datelike;
    let now = Local::now();
    let offset_at = |month: u32| {
        Local
            .with_ymd_and_hms(now.year(), month, 1, 12, 0, 0)
            .single()
            .map(|t| t.offset().fix().local_minus_utc())
    };
    match (offset_at(1), offset_at(7)) {
        (Some(jan), Some(jul)) if jan != jul => {
            now.offset().fix().local_minus_utc() > jan.min(jul)
        }
        _ => false,
    }
}

fn spawn_set_time(dev: Arc<Device>) {
    let spawned = std::thread::Builder::new()
        .name("settime".to_string())
        .spawn(move || {
            if let Err(e) = dev.set_generator_time() {
                tracing::error!(error = %e, "set generator time");
            }
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "spawn settime thread");
    }
}

fn time_sync_loop(dev: &Arc<Device>, stop: &AtomicBool) {
    let mut dst = is_dst();
    if !wait_for_init(dev, stop) {
        return;
    }
    let cfg = &dev.config().monitor;
    if !cfg.sync_time {
        spawn_set_time(dev.clone());
    }
    loop {
        if cfg.sync_dst && dst != is_dst() {
            dst = !dst;
            spawn_set_time(dev.clone());
            dev.notifier().send(
                &format!("Generator Time Update at {}", dev.site()),
                "Time updated due to daylight savings time change",
                Category::Info,
            );
        }
        if cfg.sync_time {
            spawn_set_time(dev.clone());
        }
        if !pause(dev.clock(), stop, TIME_SYNC_PERIOD) {
            break;
        }
    }
}

fn under_test_loop(dev: &Device, stop: &AtomicBool) {
    loop {
        let batch = dev.take_under_test_log();
        let mut body = if batch.is_empty() {
            "\nNothing Changed".to_string()
        } else {
            batch
        };
        body.push_str("\n\n");
        for (address, value) in dev.with_store(|s| s.under_test()) {
            body.push_str(&format!("{address:04x}:{value}\n"));
        }
        dev.notifier()
            .send(crate::device::UNDER_TEST_SUBJECT, &body, Category::Info);
        if !pause(dev.clock(), stop, UNDER_TEST_PERIOD) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingNotifier;
    use genmon_hardware::{SimHandle, SimulatedController};
    use genmon_traits::MonotonicClock;

    fn start(cfg: Config) -> (Arc<Monitor>, SimHandle, Arc<RecordingNotifier>) {
        let handle = SimulatedController::preset(0x09).handle();
        let sim = handle.clone();
        let notes = Arc::new(RecordingNotifier::default());
        let factory = move |_: &Config| -> eyre::Result<Box<dyn Transport>> {
            Ok(Box::new(SimulatedController::with_handle(sim.clone())))
        };
        let reload_cfg = cfg.clone();
        let monitor = Monitor::start(
            cfg,
            Box::new(factory),
            Box::new(move || -> eyre::Result<Config> { Ok(reload_cfg.clone()) }),
            notes.clone(),
            Arc::new(MonotonicClock::new()),
        )
        .unwrap();
        (monitor, handle, notes)
    }

    fn config(dir: &tempfile::TempDir) -> Config {
        let mut cfg = Config::default();
        cfg.site.name = "Barn".to_string();
        cfg.paths.feedback_file = dir.path().join("feedback.json");
        cfg.paths.outage_log = Some(dir.path().join("outage.txt"));
        cfg
    }

    fn wait_until(f: impl Fn() -> bool) {
        for _ in 0..200 {
            if f() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("condition not reached");
    }

    #[test]
    fn socket_replies_end_with_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _sim, _notes) = start(config(&dir));
        wait_until(|| m.device().is_initialized());

        let reply = m.process_command("generator: getsitename", true);
        assert_eq!(reply, "BarnEndOfMessage");
        let reply = m.process_command("status", true);
        assert_eq!(
            reply,
            format!("{}EndOfMessage", commands::MISSING_PREFIX_REPLY)
        );
        let reply = m.process_command("generator: bogus", true);
        assert!(reply.starts_with("Invalid GENERATOR command: bogus\n"));
        m.shutdown();
    }

    #[test]
    fn json_verbs_replace_the_body() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _sim, _notes) = start(config(&dir));
        wait_until(|| m.device().is_initialized());
        let reply = m.process_command("generator: getsitename status_json", true);
        let json = reply.strip_suffix("EndOfMessage").unwrap();
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        assert!(v.get("Status").is_some());
        m.shutdown();
    }

    #[test]
    fn non_socket_channel_gets_a_notice() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _sim, notes) = start(config(&dir));
        let reply = m.process_command("generator: getsitename help", false);
        assert!(!reply.contains("Barn"));
        assert!(reply.contains("Help:\n"));
        assert_eq!(notes.with_subject("Generator Command Response at Barn").len(), 1);
        m.shutdown();
        assert_eq!(notes.with_subject("Generator Monitor Stopping at Barn").len(), 1);
    }

    #[test]
    fn health_reports_dead_loops_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _sim, _notes) = start(config(&dir));
        wait_until(|| m.device().is_initialized());
        assert_eq!(m.dead_loops(), "None");
        m.shutdown();
        assert!(m.health().contains("Threads are dead."));
    }

    #[test]
    fn reload_builds_a_fresh_device() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _sim, notes) = start(config(&dir));
        let before = m.device();
        assert_eq!(m.process_command("generator: reload", true), "Genmon reloadedEndOfMessage");
        assert!(!Arc::ptr_eq(&before, &m.device()));
        assert_eq!(notes.with_subject("Generator Monitor Reload at Barn").len(), 1);
        m.shutdown();
    }

    #[test]
    fn reload_failure_leaves_loops_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let sim = SimulatedController::preset(0x09).handle();
        let monitor = Monitor::start(
            cfg,
            Box::new(move |_: &Config| -> eyre::Result<Box<dyn Transport>> {
                Ok(Box::new(SimulatedController::with_handle(sim.clone())))
            }),
            Box::new(|| -> eyre::Result<Config> { eyre::bail!("config unreadable") }),
            Arc::new(RecordingNotifier::default()),
            Arc::new(MonotonicClock::new()),
        )
        .unwrap();
        assert_eq!(monitor.reload(), RELOAD_CONFIG_ERROR);
        assert!(monitor.health().contains("Threads are dead."));
    }

    /// Refuses a second link while the first is still open.
    struct ExclusivePort {
        sim: SimHandle,
        open: Arc<AtomicBool>,
    }

    struct PortLink {
        inner: SimulatedController,
        open: Arc<AtomicBool>,
    }

    impl Transport for PortLink {
        fn read_registers(
            &mut self,
            address: u16,
            words: u16,
            timeout: Duration,
        ) -> Result<String, genmon_traits::BoxError> {
            self.inner.read_registers(address, words, timeout)
        }

        fn write_registers(
            &mut self,
            address: u16,
            words: u16,
            data: &[u8],
            timeout: Duration,
        ) -> Result<(), genmon_traits::BoxError> {
            self.inner.write_registers(address, words, data, timeout)
        }

        fn stats(&self) -> genmon_traits::TransportStats {
            self.inner.stats()
        }
    }

    impl Drop for PortLink {
        fn drop(&mut self) {
            self.open.store(false, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl TransportFactory for ExclusivePort {
        fn open(&self, _: &Config) -> eyre::Result<Box<dyn Transport>> {
            if self.open.swap(true, std::sync::atomic::Ordering::SeqCst) {
                eyre::bail!("port busy");
            }
            Ok(Box::new(PortLink {
                inner: SimulatedController::with_handle(self.sim.clone()),
                open: self.open.clone(),
            }))
        }
    }

    #[test]
    fn reload_releases_the_old_link_first() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let reload_cfg = cfg.clone();
        let monitor = Monitor::start(
            cfg,
            Box::new(ExclusivePort {
                sim: SimulatedController::preset(0x09).handle(),
                open: Arc::new(AtomicBool::new(false)),
            }),
            Box::new(move || -> eyre::Result<Config> { Ok(reload_cfg.clone()) }),
            Arc::new(RecordingNotifier::default()),
            Arc::new(MonotonicClock::new()),
        )
        .unwrap();
        assert_eq!(
            monitor.process_command("generator: reload", true),
            "Genmon reloadedEndOfMessage"
        );
        wait_until(|| monitor.device().is_initialized());
        monitor.shutdown();
    }

    #[test]
    fn greeting_reports_state() {
        let dir = tempfile::tempdir().unwrap();
        let (m, _sim, _notes) = start(config(&dir));
        wait_until(|| m.device().is_initialized());
        let g = m.greeting();
        assert!(g.ends_with(": Auto, Off - Ready"), "{g}");
        m.shutdown();
    }
}
