//! One logger cycle: measure, record, deliver or queue, mirror.
//!
//! The platform decides when a cycle runs and whether the network is up;
//! [`Station`] does everything in between. Nothing in a cycle is fatal: every
//! failure is written to the log store and summarized in the [`CycleReport`].

use alloc::format;

use log::warn;

use crate::config::Config;
use crate::mirror;
use crate::ota::{self, Manifest, UpdateError};
use crate::payload;
use crate::reading::Reading;
use crate::sampling::Acquisition;
use crate::schedule;
use crate::storage::{Clock, LogLevel, LogStore, Storage};
use crate::uplink::{self, Uplink};

/// What happened to the cycle's reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the collector.
    Sent,
    /// Handed to the retry queue.
    Queued,
    /// No reading to deliver.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    /// 1-based cycle number since boot.
    pub cycle: u32,
    pub timestamp: i64,
    pub reading: Option<Reading>,
    pub delivery: Delivery,
    /// Outcome of the queue replay, `None` when offline or skipped.
    pub queue_cleared: Option<bool>,
    pub mirrored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    /// Not due, offline, or disabled.
    Skipped,
    UpToDate,
    Available(Manifest),
    Failed(UpdateError),
}

pub struct Station<A, S, K, U> {
    instruments: A,
    log: LogStore<S, K>,
    uplink: U,
    config: Config,
    cycles: u32,
}

impl<A, S, K, U> Station<A, S, K, U>
where
    A: Acquisition,
    S: Storage,
    K: Clock,
    U: Uplink,
{
    pub fn new(instruments: A, log: LogStore<S, K>, uplink: U, config: Config) -> Self {
        Self {
            instruments,
            log,
            uplink,
            config,
            cycles: 0,
        }
    }

    /// Mount storage and record the running configuration.
    pub fn boot(&mut self) -> bool {
        let mounted = self.log.mount();
        self.log.append(&format!(
            "[SYSTEM] device{} firmware v{}",
            self.config.device.id, self.config.device.firmware_version
        ));
        self.log.append(&format!(
            "[SYSTEM] Interval {} min, warm-up {} s, window {} s / {} s",
            self.config.timing.measure_interval_min,
            self.config.timing.sps30_warmup_sec,
            self.config.timing.sample_duration_sec,
            self.config.timing.sample_interval_sec
        ));
        mounted
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn log(&self) -> &LogStore<S, K> {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut LogStore<S, K> {
        &mut self.log
    }

    pub fn instruments_mut(&mut self) -> &mut A {
        &mut self.instruments
    }

    pub fn uplink(&self) -> &U {
        &self.uplink
    }

    pub fn uplink_mut(&mut self) -> &mut U {
        &mut self.uplink
    }

    /// Unix time of the next aligned send slot.
    pub fn next_send(&self) -> i64 {
        schedule::next_send(
            self.log.now(),
            self.config.timing.measure_interval_min,
            self.log.offset(),
        )
    }

    /// Seconds the platform should sleep before the next cycle.
    pub fn seconds_to_next_send(&self) -> u64 {
        schedule::seconds_until(self.next_send(), self.log.now())
    }

    pub async fn run_cycle(&mut self, online: bool) -> CycleReport {
        self.cycles = self.cycles.wrapping_add(1);
        let timing = self.config.timing.clone();

        self.log
            .append(&format!("[CYCLE] ===== Cycle {} =====", self.cycles));

        self.instruments.warm_up(timing.sps30_warmup_sec).await;
        let sampled = self
            .instruments
            .sample(timing.sample_duration_sec, timing.sample_interval_sec)
            .await;
        self.instruments.power_down().await;

        let timestamp = self.log.now();
        let mut report = CycleReport {
            cycle: self.cycles,
            timestamp,
            reading: None,
            delivery: Delivery::Skipped,
            queue_cleared: None,
            mirrored: false,
        };

        let reading = match sampled {
            Ok(reading) => reading,
            Err(e) => {
                self.log
                    .note(LogLevel::Error, &format!("[CYCLE] Sampling failed: {}", e));
                self.finish();
                return report;
            }
        };
        report.reading = Some(reading);
        self.log.append_data_row(&reading, timestamp);

        let body = match payload::encode(
            &self.config.device.id,
            timestamp,
            self.log.offset(),
            &reading,
        ) {
            Ok(body) => body,
            Err(e) => {
                self.log
                    .note(LogLevel::Error, &format!("[CYCLE] ERROR: {}", e));
                self.finish();
                return report;
            }
        };

        if !online {
            self.log
                .note(LogLevel::Warn, "[CYCLE] Offline, queueing measurement");
            self.log
                .queue(&self.config.device.id)
                .enqueue(timestamp, &reading);
            report.delivery = Delivery::Queued;
            self.finish();
            return report;
        }

        let url = &self.config.endpoints.post_url;
        report.queue_cleared = Some(
            self.log
                .queue(&self.config.device.id)
                .flush(&mut self.uplink, url)
                .await,
        );

        if uplink::deliver(&mut self.uplink, &mut self.log, url, body.as_bytes()).await {
            self.log.append("[CYCLE] Measurement delivered");
            report.delivery = Delivery::Sent;
            report.mirrored = self.mirror().await;
        } else {
            self.log
                .note(LogLevel::Warn, "[CYCLE] Delivery failed, queueing measurement");
            self.log
                .queue(&self.config.device.id)
                .enqueue(timestamp, &reading);
            report.delivery = Delivery::Queued;
        }

        self.finish();
        report
    }

    async fn mirror(&mut self) -> bool {
        if self.config.endpoints.s3_bucket.is_empty() {
            self.log.note(LogLevel::Debug, "[S3-LOG] No bucket configured");
            return false;
        }
        let target = self.config.mirror_target();
        mirror::upload_log(&mut self.log, &mut self.uplink, &target).await
    }

    /// Run the update check when online and every `update_check_every`
    /// completed cycles.
    pub async fn maybe_check_update(&mut self, online: bool) -> UpdateCheck {
        let every = self.config.timing.update_check_every;
        if !online || every == 0 || self.cycles == 0 || self.cycles % every != 0 {
            return UpdateCheck::Skipped;
        }
        self.check_update().await
    }

    /// Fetch the manifest now and log the decision.
    pub async fn check_update(&mut self) -> UpdateCheck {
        if self.config.endpoints.manifest_url.is_empty() {
            return UpdateCheck::Skipped;
        }

        let outcome = ota::check_for_update(
            &mut self.uplink,
            &self.config.endpoints.manifest_url,
            &self.config.device.firmware_version,
        )
        .await;

        let check = match outcome {
            Ok(Some(manifest)) => {
                self.log.append(&format!(
                    "[OTA] Update available: v{} at {}",
                    manifest.version, manifest.url
                ));
                UpdateCheck::Available(manifest)
            }
            Ok(None) => {
                self.log.append("[OTA] Firmware is up to date");
                UpdateCheck::UpToDate
            }
            Err(e) => {
                self.log
                    .note(LogLevel::Warn, &format!("[OTA] Update check failed: {}", e));
                UpdateCheck::Failed(e)
            }
        };
        self.finish();
        check
    }

    fn finish(&mut self) {
        if let Err(e) = self.log.flush() {
            warn!("[CYCLE] Log flush failed: {}", e);
        }
    }
}
