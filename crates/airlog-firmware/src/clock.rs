//! Wall clock anchored by SNTP and advanced by the embassy monotonic timer.

use core::cell::Cell;

use airlog_core::storage::Clock;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;

/// Anything earlier is an unsynced clock.
const SYNCED_AFTER: i64 = 100_000;

#[derive(Clone, Copy)]
struct Anchor {
    unix: i64,
    at_secs: u64,
}

pub struct NetClock {
    anchor: Mutex<CriticalSectionRawMutex, Cell<Anchor>>,
}

impl NetClock {
    pub const fn new() -> Self {
        Self {
            anchor: Mutex::new(Cell::new(Anchor {
                unix: 0,
                at_secs: 0,
            })),
        }
    }

    /// Pin the clock to `unix` seconds as of now.
    pub fn set(&self, unix: i64) {
        let anchor = Anchor {
            unix,
            at_secs: Instant::now().as_secs(),
        };
        self.anchor.lock(|cell| cell.set(anchor));
    }

    pub fn is_synced(&self) -> bool {
        self.now() > SYNCED_AFTER
    }
}

impl Default for NetClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for NetClock {
    fn now(&self) -> i64 {
        let anchor = self.anchor.lock(|cell| cell.get());
        let elapsed = Instant::now().as_secs().saturating_sub(anchor.at_secs);
        anchor.unix + elapsed as i64
    }
}
