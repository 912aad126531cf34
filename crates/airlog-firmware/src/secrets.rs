//! Values baked in at build time from `.env` (see `build.rs`).

use airlog_core::config::Config;
use alloc::string::String;
use log::warn;

pub const WIFI_SSID: &str = env!("WIFI_SSID");
pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

pub const DEVICE_ID: &str = env!("AIRLOG_DEVICE_ID");
pub const POST_URL: &str = env!("AIRLOG_POST_URL");
pub const S3_BUCKET: &str = env!("AIRLOG_S3_BUCKET");
pub const S3_REGION: &str = env!("AIRLOG_S3_REGION");
pub const MANIFEST_URL: &str = env!("AIRLOG_MANIFEST_URL");
/// Empty when unset; the core default applies.
pub const TZ_OFFSET_HOURS: &str = env!("AIRLOG_TZ_OFFSET_HOURS");

fn set_if_present(field: &mut String, value: &str) {
    if !value.is_empty() {
        *field = String::from(value);
    }
}

/// Default logger configuration with the baked values applied on top.
pub fn baked_config() -> Config {
    let mut config = Config::default();
    set_if_present(&mut config.device.id, DEVICE_ID);
    config.device.firmware_version = String::from(env!("CARGO_PKG_VERSION"));
    set_if_present(&mut config.endpoints.post_url, POST_URL);
    set_if_present(&mut config.endpoints.s3_bucket, S3_BUCKET);
    set_if_present(&mut config.endpoints.s3_region, S3_REGION);
    set_if_present(&mut config.endpoints.manifest_url, MANIFEST_URL);

    if !TZ_OFFSET_HOURS.is_empty() {
        match TZ_OFFSET_HOURS.parse::<i8>() {
            Ok(hours) => config.timing.tz_offset_hours = hours,
            Err(_) => warn!(
                "[CFG] Ignoring AIRLOG_TZ_OFFSET_HOURS={:?}",
                TZ_OFFSET_HOURS
            ),
        }
    }

    config
}
