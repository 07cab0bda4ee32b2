//! Named background threads with cooperative shutdown.
//!
//! Each `Worker` owns exactly one thread. Dropping the worker sets its stop
//! flag and joins the thread, so loops are never killed mid-transaction and
//! never leak.

use genmon_traits::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Granularity of stop-flag checks while a loop waits.
pub const STOP_POLL: Duration = Duration::from_millis(250);

pub struct Worker {
    name: &'static str,
    /// Shutdown flag, checked by the loop each iteration
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a thread named `name`. The closure receives the stop
    /// flag and must return once it is set.
    pub fn spawn<F>(name: &'static str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                body(flag);
                tracing::trace!(worker = name, "worker exiting cleanly");
            })?;
        tracing::debug!(worker = name, "worker started");
        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ask the loop to stop without waiting for it.
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!(worker = self.name, "worker joined"),
                Err(e) => tracing::warn!(?e, worker = self.name, "worker panicked during shutdown"),
            }
        }
    }
}

pub fn stopped(stop: &AtomicBool) -> bool {
    stop.load(Ordering::Relaxed)
}

/// Sleep for `total` in [`STOP_POLL`] slices. Returns `false` as soon as the
/// stop flag is seen.
pub fn pause(clock: &dyn Clock, stop: &AtomicBool, total: Duration) -> bool {
    let mut left = total;
    while !left.is_zero() {
        if stopped(stop) {
            return false;
        }
        let step = left.min(STOP_POLL);
        clock.sleep(step);
        left -= step;
    }
    !stopped(stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use genmon_traits::MonotonicClock;
    use genmon_traits::clock::test_clock::TestClock;

    #[test]
    fn drop_stops_and_joins() {
        let w = Worker::spawn("spin", |stop| {
            while !stopped(&stop) {
                std::thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();
        assert!(w.is_alive());
        assert_eq!(w.name(), "spin");
        drop(w);
    }

    #[test]
    fn finished_worker_reports_dead() {
        let w = Worker::spawn("once", |_| {}).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!w.is_alive());
    }

    #[test]
    fn panicking_worker_is_dead_and_drop_survives() {
        let w = Worker::spawn("boom", |_| panic!("loop failed")).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!w.is_alive());
        drop(w);
    }

    #[test]
    fn pause_honours_stop_flag() {
        let clock = TestClock::new();
        let t0 = clock.now();
        let stop = AtomicBool::new(false);
        assert!(pause(&clock, &stop, Duration::from_secs(2)));
        assert_eq!(clock.ms_since(t0), 2_000);

        stop.store(true, Ordering::Relaxed);
        assert!(!pause(&MonotonicClock::new(), &stop, Duration::from_secs(60)));
    }
}
