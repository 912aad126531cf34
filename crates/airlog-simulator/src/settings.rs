//! Simulator settings and logger configuration from `AIRLOG_*` variables.
//!
//! `AIRLOG_CONFIG` may point at a JSON file holding a full or partial
//! [`Config`]; individual variables override it.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use airlog_core::config::{Co2Policy, Config};
use log::warn;
use thiserror_no_std::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct SimSettings {
    /// Cycles to run before exiting.
    pub cycles: u32,
    pub data_dir: PathBuf,
    pub outbox_dir: PathBuf,
    /// Fail every N-th HTTP request. 0 never fails.
    pub fail_every: u32,
    /// Report the network down on every N-th cycle. 0 is always online.
    pub offline_every: u32,
    /// Corrupt every N-th sensor response. 0 never corrupts.
    pub crc_fault_every: u32,
    /// Sleep for real on every delay.
    pub realtime: bool,
}

impl SimSettings {
    pub fn from_env() -> Self {
        Self {
            cycles: var_or("AIRLOG_CYCLES", 6),
            data_dir: PathBuf::from(var_or("AIRLOG_DATA_DIR", String::from("sim-data/sd"))),
            outbox_dir: PathBuf::from(var_or(
                "AIRLOG_OUTBOX_DIR",
                String::from("sim-data/outbox"),
            )),
            fail_every: var_or("AIRLOG_FAIL_EVERY", 4),
            offline_every: var_or("AIRLOG_OFFLINE_EVERY", 5),
            crc_fault_every: var_or("AIRLOG_CRC_FAULT_EVERY", 37),
            realtime: var_or("AIRLOG_REALTIME", false),
        }
    }

    pub fn is_online(&self, cycle: u32) -> bool {
        self.offline_every == 0 || cycle % self.offline_every != 0
    }
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("[SIM] Ignoring unparsable {}={}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn override_string(target: &mut String, name: &str) {
    if let Ok(value) = env::var(name) {
        *target = value;
    }
}

fn override_parsed<T: FromStr>(target: &mut T, name: &str) {
    if let Ok(raw) = env::var(name) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!("[SIM] Ignoring unparsable {}={}", name, raw),
        }
    }
}

/// Parse a JSON [`Config`] file. Missing fields take their defaults.
pub fn read_config_file(path: &Path) -> Result<Config, SettingsError> {
    let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SettingsError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_config() -> Result<Config, SettingsError> {
    let mut config = match env::var("AIRLOG_CONFIG") {
        Ok(path) => read_config_file(Path::new(&path))?,
        Err(_) => Config::default(),
    };

    override_string(&mut config.device.id, "AIRLOG_DEVICE_ID");
    override_string(&mut config.device.firmware_version, "AIRLOG_FIRMWARE_VERSION");
    override_string(&mut config.endpoints.post_url, "AIRLOG_POST_URL");
    override_string(&mut config.endpoints.s3_bucket, "AIRLOG_S3_BUCKET");
    override_string(&mut config.endpoints.s3_region, "AIRLOG_S3_REGION");
    override_string(&mut config.endpoints.manifest_url, "AIRLOG_MANIFEST_URL");

    let timing = &mut config.timing;
    override_parsed(&mut timing.measure_interval_min, "AIRLOG_MEASURE_INTERVAL_MIN");
    override_parsed(&mut timing.sps30_warmup_sec, "AIRLOG_SPS30_WARMUP_SEC");
    override_parsed(&mut timing.sample_duration_sec, "AIRLOG_SAMPLE_DURATION_SEC");
    override_parsed(&mut timing.sample_interval_sec, "AIRLOG_SAMPLE_INTERVAL_SEC");
    override_parsed(&mut timing.tz_offset_hours, "AIRLOG_TZ_OFFSET_HOURS");
    override_parsed(&mut timing.update_check_every, "AIRLOG_UPDATE_CHECK_EVERY");

    if let Ok(raw) = env::var("AIRLOG_CO2_POLICY") {
        config.co2_policy = match raw.trim() {
            "hold-last" => Co2Policy::HoldLast,
            "skip-not-ready" => Co2Policy::SkipNotReady,
            other => {
                warn!("[SIM] Unknown AIRLOG_CO2_POLICY {}, keeping default", other);
                config.co2_policy
            }
        };
    }

    if config.device.id.is_empty() {
        config.device.id = String::from("0");
    }
    if config.endpoints.post_url.is_empty() {
        config.endpoints.post_url = String::from("http://collector.local/api/readings");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_schedule() {
        let settings = SimSettings {
            cycles: 10,
            data_dir: PathBuf::new(),
            outbox_dir: PathBuf::new(),
            fail_every: 0,
            offline_every: 3,
            crc_fault_every: 0,
            realtime: false,
        };
        let online: Vec<bool> = (1..=6).map(|c| settings.is_online(c)).collect();
        assert_eq!(online, [true, true, false, true, true, false]);
    }

    #[test]
    fn test_config_file_errors_are_typed() {
        let dir = std::env::temp_dir().join(format!("airlog-settings-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let missing = dir.join("missing.json");
        assert!(matches!(
            read_config_file(&missing),
            Err(SettingsError::Read { .. })
        ));

        let broken = dir.join("broken.json");
        fs::write(&broken, "{ \"device\": ").unwrap();
        let err = read_config_file(&broken).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert!(err.to_string().starts_with("Invalid JSON in "));

        let partial = dir.join("partial.json");
        fs::write(&partial, "{}").unwrap();
        assert!(read_config_file(&partial).is_ok());

        let _ = fs::remove_dir_all(&dir);
    }
}
