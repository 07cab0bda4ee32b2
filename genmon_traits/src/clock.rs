use chrono::NaiveDateTime;
use std::thread;
use std::time::{Duration, Instant};

/// Clock abstraction shared by every monitoring loop.
///
/// - now(): returns a monotonic Instant used for pacing and stall detection
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - wall(): local wall-clock time used for log timestamps and outage records
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Local wall-clock time.
    fn wall(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Default, real-time clock backed by std::time::Instant and the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Deterministic test clock whose time can be advanced manually.
    ///
    /// now() = origin + offset, wall() = wall_origin + offset.
    /// sleep(d) advances internal time by d without actually sleeping.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        wall_origin: NaiveDateTime,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self::at(chrono::Local::now().naive_local())
        }

        /// A clock whose wall time starts at `wall_origin`.
        pub fn at(wall_origin: NaiveDateTime) -> Self {
            Self {
                origin: Instant::now(),
                wall_origin,
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Set the absolute offset relative to origin.
        pub fn set_offset(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = d;
            }
        }

        fn offset(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.offset()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }

        fn wall(&self) -> NaiveDateTime {
            let off = chrono::Duration::from_std(self.offset())
                .unwrap_or_else(|_| chrono::Duration::zero());
            self.wall_origin + off
        }
    }

}
