//! Offline retry queue: one JSON payload per line in [`QUEUE_FILE`].
//!
//! Replay deletes the file and rewrites only the lines that still fail. A
//! crash between the delete and the rewrite loses those lines; the FAT driver
//! offers no atomic rename to close that window.

use alloc::format;
use alloc::vec::Vec;

use super::log_store::{LogLevel, LogStore};
use super::{Clock, Storage, StorageError};
use crate::payload;
use crate::reading::Reading;
use crate::uplink::{self, Uplink};

pub const QUEUE_FILE: &str = "QUEUE.TXT";

const READ_CHUNK: usize = 256;

pub struct RetryQueue<'a, S, C> {
    log: &'a mut LogStore<S, C>,
    device_id: &'a str,
}

impl<'a, S: Storage, C: Clock> RetryQueue<'a, S, C> {
    pub fn new(log: &'a mut LogStore<S, C>, device_id: &'a str) -> Self {
        Self { log, device_id }
    }

    /// Serialize `reading` exactly like a live send and append it as a line.
    pub fn enqueue(&mut self, timestamp: i64, reading: &Reading) {
        if !self.log.is_available() {
            self.log.note(
                LogLevel::Error,
                "[QUEUE] ERROR: SD not available, measurement lost",
            );
            return;
        }

        let line = match payload::encode(self.device_id, timestamp, self.log.offset(), reading) {
            Ok(json) => json,
            Err(e) => {
                self.log
                    .note(LogLevel::Error, &format!("[QUEUE] ERROR: {}", e));
                return;
            }
        };

        let mut bytes = line.into_bytes();
        bytes.push(b'\n');

        match self.log.storage_mut().append(QUEUE_FILE, &bytes) {
            Ok(()) => self.log.append(&format!(
                "[QUEUE] Entry saved ({} bytes) -> {}",
                bytes.len() - 1,
                QUEUE_FILE
            )),
            Err(e) => self.log.note(
                LogLevel::Error,
                &format!("[QUEUE] ERROR: Cannot write queue file: {}", e),
            ),
        }
    }

    /// True when the queue file exists and is non-empty.
    pub fn has_pending(&mut self) -> bool {
        if !self.log.is_available() {
            return false;
        }
        matches!(self.log.storage_mut().size(QUEUE_FILE), Ok(Some(size)) if size > 0)
    }

    /// Every non-empty, whitespace-trimmed line in file order.
    pub fn pending_lines(&mut self) -> Result<Vec<Vec<u8>>, StorageError> {
        let contents = read_all(self.log.storage_mut(), QUEUE_FILE)?;
        Ok(contents
            .split(|b| *b == b'\n')
            .map(<[u8]>::trim_ascii)
            .filter(|line| !line.is_empty())
            .map(<[u8]>::to_vec)
            .collect())
    }

    /// Replay every queued line against `url`.
    ///
    /// Lines whose delivery succeeds are dropped; the rest are written back
    /// in their original order. Returns true iff the queue file ends up
    /// deleted.
    pub async fn flush<U: Uplink>(&mut self, uplink: &mut U, url: &str) -> bool {
        if !self.log.is_available() {
            return true;
        }
        match self.log.storage_mut().size(QUEUE_FILE) {
            Ok(Some(_)) => {}
            Ok(None) => return true,
            Err(e) => {
                self.log.note(
                    LogLevel::Error,
                    &format!("[QUEUE] ERROR: Cannot open queue for reading: {}", e),
                );
                return false;
            }
        }

        let pending = match self.pending_lines() {
            Ok(lines) => lines,
            Err(e) => {
                self.log.note(
                    LogLevel::Error,
                    &format!("[QUEUE] ERROR: Cannot read queue: {}", e),
                );
                return false;
            }
        };

        if pending.is_empty() {
            return self.log.storage_mut().remove(QUEUE_FILE).is_ok();
        }

        self.log.append(&format!(
            "[QUEUE] Replaying {} queued entry/entries...",
            pending.len()
        ));

        let mut failed = Vec::new();
        for line in pending {
            if uplink::deliver(uplink, self.log, url, &line).await {
                self.log.append("[QUEUE] Entry sent successfully");
            } else {
                self.log
                    .append("[QUEUE] Entry still failing, keeping for next attempt");
                failed.push(line);
            }
        }

        let removed = self.log.storage_mut().remove(QUEUE_FILE);

        if failed.is_empty() {
            return match removed {
                Ok(()) => {
                    self.log.append("[QUEUE] All queued entries sent, queue cleared");
                    true
                }
                Err(e) => {
                    self.log.note(
                        LogLevel::Error,
                        &format!("[QUEUE] ERROR: Cannot delete queue file: {}", e),
                    );
                    false
                }
            };
        }

        let mut rewrite = Vec::new();
        for line in &failed {
            rewrite.extend_from_slice(line);
            rewrite.push(b'\n');
        }
        // Truncating write also covers a failed delete
        if let Err(e) = self.log.storage_mut().write(QUEUE_FILE, &rewrite) {
            self.log.note(
                LogLevel::Error,
                &format!("[QUEUE] ERROR: Failed entries not rewritten: {}", e),
            );
        }
        self.log.append(&format!(
            "[QUEUE] {} entry/entries remain in queue",
            failed.len()
        ));
        false
    }
}

/// Read a whole file in fixed-size chunks. A missing file reads as empty.
pub(crate) fn read_all<S: Storage>(
    storage: &mut S,
    name: &'static str,
) -> Result<Vec<u8>, StorageError> {
    let mut contents = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let offset = contents.len() as u32;
        let read = match storage.read_at(name, offset, &mut chunk) {
            Ok(read) => read,
            Err(StorageError::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if read == 0 {
            break;
        }
        contents.extend_from_slice(&chunk[..read]);
    }
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedClock, MemStorage, ScriptedUplink};
    use crate::timefmt::offset_from_hours;
    use alloc::string::String;
    use alloc::vec;
    use embassy_futures::block_on;

    const NOW: i64 = 1_709_281_815;
    const URL: &str = "http://collector.local/api/readings";

    fn mounted() -> LogStore<MemStorage, FixedClock> {
        let mut store = LogStore::new(MemStorage::new(), FixedClock(NOW), offset_from_hours(4));
        assert!(store.mount());
        store
    }

    fn reading(temperature: f32) -> Reading {
        Reading {
            temperature,
            ..Reading::default()
        }
    }

    fn queued_lines(store: &LogStore<MemStorage, FixedClock>) -> Vec<String> {
        store
            .storage()
            .contents(QUEUE_FILE)
            .map(|bytes| {
                String::from_utf8(bytes)
                    .unwrap()
                    .lines()
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_enqueue_appends_live_payload() {
        let mut store = mounted();

        store.queue("7").enqueue(NOW, &reading(20.0));
        store.queue("7").enqueue(NOW + 300, &reading(21.0));

        let lines = queued_lines(&store);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            payload::encode("7", NOW, offset_from_hours(4), &reading(20.0)).unwrap()
        );
        assert_eq!(
            lines[1],
            payload::encode("7", NOW + 300, offset_from_hours(4), &reading(21.0)).unwrap()
        );
        assert!(store.queue("7").has_pending());
    }

    #[test]
    fn test_partial_replay_keeps_only_failures() {
        let mut store = mounted();
        for t in [20.0, 21.0, 22.0] {
            store.queue("7").enqueue(NOW, &reading(t));
        }
        let original = queued_lines(&store);

        let mut uplink = ScriptedUplink::new();
        uplink.push_post(Ok(200));
        uplink.push_post(Ok(503));
        uplink.push_post(Ok(201));

        assert!(!block_on(store.queue("7").flush(&mut uplink, URL)));

        assert_eq!(queued_lines(&store), vec![original[1].clone()]);
        assert!(store.queue("7").has_pending());
        let sent: Vec<String> = uplink
            .posts()
            .iter()
            .map(|(url, body)| {
                assert_eq!(url, URL);
                String::from_utf8(body.clone()).unwrap()
            })
            .collect();
        assert_eq!(sent, original);

        let mut uplink = ScriptedUplink::new();
        uplink.push_post(Ok(200));

        assert!(block_on(store.queue("7").flush(&mut uplink, URL)));
        assert!(!store.queue("7").has_pending());
        assert_eq!(store.storage().contents(QUEUE_FILE), None);
    }

    #[test]
    fn test_failures_keep_relative_order() {
        let mut store = mounted();
        for t in [1.0, 2.0, 3.0, 4.0] {
            store.queue("7").enqueue(NOW, &reading(t));
        }
        let original = queued_lines(&store);

        let mut uplink = ScriptedUplink::new();
        uplink.push_post(Err(crate::uplink::UplinkError::Connect));
        uplink.push_post(Ok(200));
        uplink.push_post(Ok(500));
        uplink.push_post(Ok(201));

        assert!(!block_on(store.queue("7").flush(&mut uplink, URL)));
        assert_eq!(
            queued_lines(&store),
            vec![original[0].clone(), original[2].clone()]
        );
    }

    #[test]
    fn test_blank_and_padded_lines_are_normalized() {
        let mut store = mounted();
        store
            .storage_mut()
            .append(QUEUE_FILE, b"\n  {\"a\":1}  \r\n\n{\"b\":2}\n")
            .unwrap();

        let mut uplink = ScriptedUplink::new();
        uplink.push_post(Ok(200));
        uplink.push_post(Ok(404));

        assert!(!block_on(store.queue("7").flush(&mut uplink, URL)));
        assert_eq!(uplink.posts()[0].1, b"{\"a\":1}".to_vec());
        assert_eq!(queued_lines(&store), vec![String::from("{\"b\":2}")]);
    }

    #[test]
    fn test_missing_queue_flushes_clean() {
        let mut store = mounted();
        let mut uplink = ScriptedUplink::new();

        assert!(!store.queue("7").has_pending());
        assert!(block_on(store.queue("7").flush(&mut uplink, URL)));
        assert!(uplink.posts().is_empty());
    }

    #[test]
    fn test_empty_file_is_removed() {
        let mut store = mounted();
        store.storage_mut().write(QUEUE_FILE, b"\n\n").unwrap();

        assert!(block_on(store.queue("7").flush(&mut ScriptedUplink::new(), URL)));
        assert_eq!(store.storage().contents(QUEUE_FILE), None);
    }

    #[test]
    fn test_enqueue_without_storage_is_lost_not_fatal() {
        let mut storage = MemStorage::new();
        storage.set_present(false);
        let mut store = LogStore::new(storage, FixedClock(NOW), offset_from_hours(4));
        store.mount();

        store.queue("7").enqueue(NOW, &reading(20.0));

        assert!(!store.queue("7").has_pending());
        assert_eq!(store.storage().contents(QUEUE_FILE), None);
    }
}
