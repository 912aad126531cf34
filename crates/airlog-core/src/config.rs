use alloc::string::String;

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use crate::mirror::MirrorTarget;
use crate::timefmt;

/// What a sub-sample contributes to the CO2 sum when the SCD30 has no new
/// measurement.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Co2Policy {
    /// Add the last successful CO2 value (nothing before the first one).
    #[default]
    HoldLast,
    /// Add nothing for that sub-sample.
    SkipNotReady,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub timing: TimingConfig,
    pub endpoints: EndpointConfig,
    pub co2_policy: Co2Policy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            timing: TimingConfig::default(),
            endpoints: EndpointConfig::default(),
            co2_policy: Co2Policy::HoldLast,
        }
    }
}

impl Config {
    pub fn utc_offset(&self) -> UtcOffset {
        timefmt::offset_from_hours(self.timing.tz_offset_hours)
    }

    pub fn mirror_target(&self) -> MirrorTarget {
        MirrorTarget {
            bucket: self.endpoints.s3_bucket.clone(),
            region: self.endpoints.s3_region.clone(),
            device_id: self.device.id.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: String,
    pub firmware_version: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            firmware_version: String::from("1.0.0"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Minutes between sends, aligned to the wall clock.
    pub measure_interval_min: u32,
    /// SPS30 fan run time before sampling starts.
    pub sps30_warmup_sec: u32,
    pub sample_duration_sec: u32,
    pub sample_interval_sec: u32,
    /// Fixed offset from UTC, no DST.
    pub tz_offset_hours: i8,
    /// Run the update check every this many cycles. 0 disables it.
    pub update_check_every: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            measure_interval_min: 5,
            sps30_warmup_sec: 30,
            sample_duration_sec: 60,
            sample_interval_sec: 5,
            // Armenia
            tz_offset_hours: 4,
            update_check_every: 12,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct EndpointConfig {
    pub post_url: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub manifest_url: String,
}
