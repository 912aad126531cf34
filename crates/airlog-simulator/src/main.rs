//! Desktop simulator for the airlog environmental data logger.
//!
//! Runs the full logger cycle from `airlog-core` against simulated hardware:
//! an I2C bus that speaks the SPS30/SCD30/SGP40 protocols, a synthetic
//! BME280, a host directory standing in for the SD card, and a file-backed
//! uplink. Simulated time only moves when the drivers delay, so a run of many
//! cycles finishes in well under a second.
//!
//! # Environment
//!
//! | Variable                  | Meaning                                   |
//! |---------------------------|-------------------------------------------|
//! | `AIRLOG_CYCLES`           | Cycles to run (6)                         |
//! | `AIRLOG_DATA_DIR`         | SD card stand-in (`sim-data/sd`)          |
//! | `AIRLOG_OUTBOX_DIR`       | Uplink output (`sim-data/outbox`)         |
//! | `AIRLOG_FAIL_EVERY`       | Fail every N-th HTTP request (4)          |
//! | `AIRLOG_OFFLINE_EVERY`    | Network down every N-th cycle (5)         |
//! | `AIRLOG_CRC_FAULT_EVERY`  | Corrupt every N-th sensor response (37)   |
//! | `AIRLOG_REALTIME`         | Sleep for real (`false`)                  |
//! | `AIRLOG_CONFIG`           | JSON logger config file                   |
//!
//! Logger settings (`AIRLOG_DEVICE_ID`, `AIRLOG_POST_URL`, ...) are listed
//! in [`settings`]. A `.env` file in the working directory is loaded first.

mod fs_storage;
mod settings;
mod sim_bus;
mod sim_climate;
mod sim_clock;
mod sim_uplink;

use airlog_core::bus::SharedI2cDevice;
use airlog_core::sampling::Instruments;
use airlog_core::sensors::{GasIndexVoc, Scd30, Sgp40, Sps30};
use airlog_core::station::{Station, UpdateCheck};
use airlog_core::storage::LogStore;
use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use log::{error, info, warn};

use fs_storage::FsStorage;
use settings::SimSettings;
use sim_bus::SimI2cBus;
use sim_climate::SimBme280;
use sim_clock::{SimClock, SimDelay};
use sim_uplink::SimUplink;

/// SCD30 accepts 2..=1800 s.
fn scd30_interval(sample_interval_sec: u32) -> u16 {
    sample_interval_sec.clamp(2, 1800) as u16
}

fn log_update(check: UpdateCheck) {
    match check {
        UpdateCheck::Available(manifest) => info!(
            "[SIM] Update v{} available at {} (flashing is not simulated)",
            manifest.version, manifest.url
        ),
        UpdateCheck::Failed(e) => warn!("[SIM] Update check failed: {}", e),
        UpdateCheck::UpToDate | UpdateCheck::Skipped => {}
    }
}

fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = SimSettings::from_env();
    let config = match settings::load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("[SIM] Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "[SIM] airlog simulator: device{} for {} cycle(s)",
        config.device.id, settings.cycles
    );

    let clock = SimClock::starting_now();
    let delay = SimDelay::new(clock.clone(), settings.realtime);
    let bus = Mutex::<NoopRawMutex, _>::new(SimI2cBus::new(
        clock.clone(),
        settings.crc_fault_every,
    ));

    let mut instruments = Instruments::new(
        Sps30::new(SharedI2cDevice::new(&bus), delay.clone()),
        SimBme280::new(clock.clone()),
        Scd30::new(
            SharedI2cDevice::new(&bus),
            delay.clone(),
            scd30_interval(config.timing.sample_interval_sec),
        ),
        Sgp40::new(SharedI2cDevice::new(&bus), delay.clone()),
        GasIndexVoc::new(config.timing.sample_interval_sec as f32),
        delay.clone(),
        config.co2_policy,
    );
    let sensors = block_on(instruments.init());
    if !(sensors.pm && sensors.climate && sensors.co2 && sensors.voc) {
        warn!("[SIM] Some sensors failed to initialize: {:?}", sensors);
    }

    let log = LogStore::new(
        FsStorage::new(settings.data_dir.clone()),
        clock.clone(),
        config.utc_offset(),
    );
    let uplink = SimUplink::new(settings.outbox_dir.clone(), settings.fail_every);
    let mut station = Station::new(instruments, log, uplink, config);

    if !station.boot() {
        warn!("[SIM] Storage unavailable, running without a log file");
    }
    // The network is assumed up at boot
    log_update(block_on(station.check_update()));

    for cycle in 1..=settings.cycles {
        let wait = station.seconds_to_next_send();
        info!("[SIM] Sleeping {} s until the next slot", wait);
        clock.advance_secs(wait);

        let online = settings.is_online(cycle);
        let report = block_on(station.run_cycle(online));
        info!(
            "[SIM] Cycle {}: {:?}, queue cleared {:?}, mirrored {}",
            report.cycle, report.delivery, report.queue_cleared, report.mirrored
        );
        if let Some(reading) = report.reading {
            info!("[SIM] {}", reading.data_fields());
        }

        log_update(block_on(station.maybe_check_update(online)));
    }

    info!(
        "[SIM] Done. Log and queue in {}, uplink output in {}",
        settings.data_dir.display(),
        settings.outbox_dir.display()
    );
}
