//! Combined append-only log of LOG and DATA lines.
//!
//! Messages are buffered in RAM and written out once the buffer fills; DATA
//! rows are written out immediately. When storage is unavailable the store
//! degrades to echoing through the `log` facade and never fails the caller.

use alloc::vec::Vec;
use core::fmt::Write;

use log::{Level, debug, error, log};
use time::UtcOffset;

use super::queue::RetryQueue;
use super::{Clock, Storage, StorageError};
use crate::reading::Reading;
use crate::timefmt;

pub const LOG_FILE: &str = "DATALOG.TXT";

/// Buffered bytes that trigger an automatic flush.
pub const LOG_BUFFER_CAPACITY: usize = 1024;

/// Upper bound on buffered bytes while writes keep failing. LOG lines are
/// dropped before DATA rows, oldest first.
pub const LOG_BACKLOG_LIMIT: usize = 2 * LOG_BUFFER_CAPACITY;

const DATA_MARKER: &[u8] = b" | DATA | ";

pub const BOOT_BANNER: &str = "[SYSTEM] ========== BOOT ==========";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::Error,
            LogLevel::Warn => Level::Warn,
            LogLevel::Info => Level::Info,
            LogLevel::Debug => Level::Debug,
        }
    }
}

/// Adapter so `write!` can format straight into the byte buffer.
struct ByteWriter<'a>(&'a mut Vec<u8>);

impl Write for ByteWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

pub struct LogStore<S, C> {
    storage: S,
    clock: C,
    offset: UtcOffset,
    buffer: Vec<u8>,
    available: bool,
}

impl<S: Storage, C: Clock> LogStore<S, C> {
    pub fn new(storage: S, clock: C, offset: UtcOffset) -> Self {
        Self {
            storage,
            clock,
            offset,
            buffer: Vec::with_capacity(LOG_BUFFER_CAPACITY),
            available: false,
        }
    }

    /// Probe storage. On success, write the boot banner and flush it.
    pub fn mount(&mut self) -> bool {
        match self.storage.probe() {
            Ok(()) => {
                self.available = true;
                self.append(BOOT_BANNER);
                if let Err(e) = self.flush() {
                    error!("[SD] Boot banner not persisted: {}", e);
                }
                true
            }
            Err(e) => {
                error!("[SD] Card mount failed: {}", e);
                self.available = false;
                false
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    /// Bytes waiting for the next flush.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Retry queue sharing this store's storage and log.
    pub fn queue<'a>(&'a mut self, device_id: &'a str) -> RetryQueue<'a, S, C> {
        RetryQueue::new(self, device_id)
    }

    pub fn append(&mut self, message: &str) {
        self.note(LogLevel::Info, message);
    }

    /// Echo `message` at `level` and buffer it as a LOG line.
    pub fn note(&mut self, level: LogLevel, message: &str) {
        log!(Level::from(level), "{}", message);

        if !self.available {
            return;
        }

        let time = timefmt::format_local(self.clock.now(), self.offset);
        let _ = writeln!(ByteWriter(&mut self.buffer), "{} | LOG  | {}", time, message);
        self.flush_if_full();
    }

    /// Buffer a DATA row for `reading` and flush right away.
    pub fn append_data_row(&mut self, reading: &Reading, timestamp: i64) {
        if !self.available {
            return;
        }

        let time = timefmt::format_local(timestamp, self.offset);
        let _ = writeln!(
            ByteWriter(&mut self.buffer),
            "{} | DATA | {}",
            time,
            reading.data_fields()
        );

        if let Err(e) = self.flush() {
            error!("[SD] Data row not persisted: {}", e);
        }
    }

    fn flush_if_full(&mut self) {
        if self.buffer.len() >= LOG_BUFFER_CAPACITY {
            debug!("[SD] Log buffer full ({} bytes), flushing", self.buffer.len());
            let _ = self.flush();
        }
    }

    /// Append the buffer to [`LOG_FILE`] and clear it.
    ///
    /// A no-op when the buffer is empty or storage is unavailable. On failure
    /// the buffer is kept for the next attempt, trimmed to
    /// [`LOG_BACKLOG_LIMIT`].
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if !self.available || self.buffer.is_empty() {
            return Ok(());
        }

        match self.storage.append(LOG_FILE, &self.buffer) {
            Ok(()) => {
                self.buffer.clear();
                Ok(())
            }
            Err(e) => {
                error!("[SD] Failed to write log file: {}", e);
                self.trim_backlog();
                Err(e)
            }
        }
    }

    fn trim_backlog(&mut self) {
        let total = self.buffer.len();
        if total <= LOG_BACKLOG_LIMIT {
            return;
        }

        let mut excess = total - LOG_BACKLOG_LIMIT;
        let mut lines: Vec<&[u8]> = self.buffer.split_inclusive(|b| *b == b'\n').collect();
        for drop_data in [false, true] {
            lines.retain(|line| {
                if excess == 0 || is_data_line(line) != drop_data {
                    return true;
                }
                excess = excess.saturating_sub(line.len());
                false
            });
        }
        let kept = lines.concat();
        self.buffer = kept;

        error!(
            "[SD] Log backlog over limit, dropped {} bytes",
            total - self.buffer.len()
        );
    }
}

fn is_data_line(line: &[u8]) -> bool {
    line.windows(DATA_MARKER.len()).any(|w| w == DATA_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedClock, MemStorage};
    use crate::timefmt::offset_from_hours;
    use alloc::string::String;

    // 2024-03-01 08:30:15 UTC
    const NOW: i64 = 1_709_281_815;

    fn mounted() -> LogStore<MemStorage, FixedClock> {
        let mut store = LogStore::new(MemStorage::new(), FixedClock(NOW), offset_from_hours(4));
        assert!(store.mount());
        store
    }

    fn file_text(store: &LogStore<MemStorage, FixedClock>) -> String {
        String::from_utf8(store.storage().contents(LOG_FILE).unwrap_or_default()).unwrap()
    }

    #[test]
    fn test_mount_writes_boot_banner() {
        let store = mounted();

        assert_eq!(
            file_text(&store),
            "2024-03-01 12:30:15 | LOG  | [SYSTEM] ========== BOOT ==========\n"
        );
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_messages_stay_buffered_below_capacity() {
        let mut store = mounted();
        let before = file_text(&store);

        store.append("[CYCLE] Sampling");

        assert_eq!(file_text(&store), before);
        assert_eq!(
            store.pending(),
            b"2024-03-01 12:30:15 | LOG  | [CYCLE] Sampling\n"
        );

        store.flush().unwrap();
        assert!(file_text(&store).ends_with("| LOG  | [CYCLE] Sampling\n"));
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_buffer_flushes_automatically_at_capacity() {
        let mut store = mounted();
        let appends_before = store.storage().append_calls();

        // ~80 bytes per line, so this crosses the capacity once
        for _ in 0..20 {
            store.append("[SAMPLE] sub-sample complete, values accumulated");
        }

        assert!(store.storage().append_calls() > appends_before);
        assert!(file_text(&store).contains("[SAMPLE] sub-sample complete"));
        assert!(store.pending().len() < LOG_BUFFER_CAPACITY);
    }

    #[test]
    fn test_data_row_is_persisted_immediately() {
        let mut store = mounted();
        store.append("[CYCLE] buffered note");
        let reading = Reading {
            temperature: 21.5,
            humidity: 40.0,
            pressure: 1010.0,
            pm1: 1.0,
            pm2_5: 2.0,
            pm10: 3.0,
            co2: 500.0,
            voc: 100,
        };

        store.append_data_row(&reading, NOW);

        let text = file_text(&store);
        assert!(text.ends_with(
            "2024-03-01 12:30:15 | DATA | temp=21.50 hum=40.00 press=1010.00 co2=500 voc=100 pm1=1.00 pm2.5=2.00 pm10=3.00\n"
        ));
        assert!(text.contains("[CYCLE] buffered note"));
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_unavailable_storage_degrades_to_echo() {
        let mut storage = MemStorage::new();
        storage.set_present(false);
        let mut store = LogStore::new(storage, FixedClock(NOW), offset_from_hours(4));

        assert!(!store.mount());
        store.append("[CYCLE] offline");
        store.append_data_row(&Reading::default(), NOW);

        assert!(store.pending().is_empty());
        assert_eq!(store.flush(), Ok(()));
        assert_eq!(store.storage().contents(LOG_FILE), None);
    }

    #[test]
    fn test_failed_flush_keeps_buffer() {
        let mut store = mounted();
        store.append("[CYCLE] must survive");
        store.storage_mut().fail_writes(true);

        assert!(store.flush().is_err());
        assert!(!store.pending().is_empty());

        store.storage_mut().fail_writes(false);
        store.flush().unwrap();
        assert!(file_text(&store).contains("[CYCLE] must survive"));
    }

    #[test]
    fn test_mount_keeps_banner_when_first_write_fails() {
        let mut storage = MemStorage::new();
        storage.fail_writes(true);
        let mut store = LogStore::new(storage, FixedClock(NOW), offset_from_hours(4));

        assert!(store.mount());
        assert!(store.pending().ends_with(b"[SYSTEM] ========== BOOT ==========\n"));

        store.storage_mut().fail_writes(false);
        store.flush().unwrap();
        assert!(file_text(&store).contains(BOOT_BANNER));
    }

    #[test]
    fn test_data_rows_flush_immediately_past_capacity() {
        let mut store = mounted();
        let reading = Reading {
            temperature: 20.0,
            co2: 600.0,
            ..Reading::default()
        };

        for i in 0..30 {
            for _ in 0..3 {
                store.append("[SAMPLE] sub-sample complete, values accumulated");
            }
            let reading = Reading {
                voc: i,
                ..reading
            };
            store.append_data_row(&reading, NOW);

            assert!(store.pending().is_empty());
            let row_end = alloc::format!("voc={} pm1=0.00 pm2.5=0.00 pm10=0.00\n", i);
            assert!(file_text(&store).ends_with(&row_end));
        }

        let text = file_text(&store);
        assert!(text.len() > 4 * LOG_BUFFER_CAPACITY);
        assert_eq!(text.matches(" | DATA | ").count(), 30);
        assert_eq!(text.matches("[SAMPLE]").count(), 90);
    }

    #[test]
    fn test_persistent_write_failure_bounds_buffer() {
        let mut store = mounted();
        store.storage_mut().fail_writes(true);

        for i in 0..1000 {
            store.append("[CYCLE] upload failed, reading queued for retry");
            let reading = Reading {
                voc: i,
                ..Reading::default()
            };
            store.append_data_row(&reading, NOW);
            assert!(store.pending().len() <= LOG_BACKLOG_LIMIT);
        }

        let pending = String::from_utf8(store.pending().to_vec()).unwrap();
        assert!(pending.ends_with("voc=999 pm1=0.00 pm2.5=0.00 pm10=0.00\n"));

        store.storage_mut().fail_writes(false);
        store.flush().unwrap();
        assert!(store.pending().is_empty());
        assert!(file_text(&store).ends_with("voc=999 pm1=0.00 pm2.5=0.00 pm10=0.00\n"));
    }

    #[test]
    fn test_backlog_trim_drops_log_lines_before_data_rows() {
        let mut store = mounted();
        store.storage_mut().fail_writes(true);

        store.append_data_row(&Reading::default(), NOW);
        for _ in 0..60 {
            store.append("[SAMPLE] sub-sample complete, values accumulated");
        }

        assert!(store.pending().len() <= LOG_BACKLOG_LIMIT);
        let pending = String::from_utf8(store.pending().to_vec()).unwrap();
        assert!(pending.starts_with("2024-03-01 12:30:15 | DATA | "));
        assert!(pending.ends_with("| LOG  | [SAMPLE] sub-sample complete, values accumulated\n"));
    }

    #[test]
    fn test_log_never_truncates() {
        let mut store = mounted();
        store.append("first");
        store.flush().unwrap();
        store.append("second");
        store.flush().unwrap();

        let text = file_text(&store);
        assert!(text.starts_with("2024-03-01 12:30:15 | LOG  | [SYSTEM]"));
        let first = text.find("first").unwrap();
        let second = text.find("second").unwrap();
        assert!(first < second);
    }
}
