//! Simulated wall clock.
//!
//! Every delay the drivers request moves the clock forward instead of
//! blocking, so a 60 s sampling window finishes instantly. With `realtime`
//! set the delay also sleeps for real.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use airlog_core::storage::Clock;
use embedded_hal_async::delay::DelayNs;

#[derive(Clone)]
pub struct SimClock {
    start: i64,
    elapsed_ns: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn starting_now() -> Self {
        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Self::starting_at(start)
    }

    pub fn starting_at(unix: i64) -> Self {
        Self {
            start: unix,
            elapsed_ns: Rc::new(Cell::new(0)),
        }
    }

    pub fn advance_ns(&self, ns: u64) {
        self.elapsed_ns.set(self.elapsed_ns.get().saturating_add(ns));
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_ns(secs.saturating_mul(1_000_000_000));
    }

    /// Seconds since the simulation started, with sub-second precision.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_ns.get() as f64 / 1e9
    }
}

impl Clock for SimClock {
    fn now(&self) -> i64 {
        self.start + (self.elapsed_ns.get() / 1_000_000_000) as i64
    }
}

#[derive(Clone)]
pub struct SimDelay {
    clock: SimClock,
    realtime: bool,
}

impl SimDelay {
    pub fn new(clock: SimClock, realtime: bool) -> Self {
        Self { clock, realtime }
    }
}

impl DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_ns(u64::from(ns));
        if self.realtime {
            std::thread::sleep(Duration::from_nanos(u64::from(ns)));
        }
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.clock.advance_ns(u64::from(ms) * 1_000_000);
        if self.realtime {
            std::thread::sleep(Duration::from_millis(u64::from(ms)));
        }
    }
}
