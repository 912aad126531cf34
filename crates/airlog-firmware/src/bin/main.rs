#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use airlog_core::bus::SharedI2cDevice;
use airlog_core::sampling::Instruments;
use airlog_core::sensors::{Bme280Sensor, GasIndexVoc, Scd30, Sgp40, Sps30};
use airlog_core::station::{Station, UpdateCheck};
use airlog_core::storage::{Clock, ClockTimeSource, LogStore, SdCardStorage};
use airlog_firmware::app_state::{self, AppError, AppRunState};
use airlog_firmware::clock::NetClock;
use airlog_firmware::http::{HttpBuffers, HttpUplink, TcpState};
use airlog_firmware::{secrets, sntp, wifi};
use embassy_executor::Spawner;
use embassy_net::{Runner, StackResources};
use embassy_time::{Delay, Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiDevice};
use log::{error, info, warn};
use static_cell::{ConstStaticCell, StaticCell};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const TIME_SYNC_RETRY: Duration = Duration::from_secs(5);
/// SCD30 accepts 2..=1800 s.
const SCD30_INTERVAL_RANGE: (u32, u32) = (2, 1800);

static CLOCK: NetClock = NetClock::new();
static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static TCP_STATE: StaticCell<TcpState> = StaticCell::new();
static HTTP_BUFFERS: ConstStaticCell<HttpBuffers> = ConstStaticCell::new(HttpBuffers::new());

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

async fn halt(e: AppError) -> ! {
    error!("[APP] Fatal: {}", e);
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}

fn log_update(check: UpdateCheck) {
    match check {
        UpdateCheck::Available(manifest) => info!(
            "[OTA] v{} at {} (flashing is not performed by this build)",
            manifest.version, manifest.url
        ),
        UpdateCheck::Failed(e) => warn!("[OTA] Check failed: {}", e),
        UpdateCheck::UpToDate | UpdateCheck::Skipped => {}
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(log::LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let logger_config = secrets::baked_config();
    info!(
        "[APP] airlog device{} firmware v{}",
        logger_config.device.id, logger_config.device.firmware_version
    );
    let mut run_state = AppRunState::Uninitialized;

    // Network
    let radio = match esp_radio::init() {
        Ok(radio) => RADIO.init(radio),
        Err(e) => {
            error!("[WIFI] Radio init failed: {:?}", e);
            halt(AppError::Radio).await
        }
    };
    let (mut wifi_controller, interfaces) =
        match esp_radio::wifi::new(radio, peripherals.WIFI, Default::default()) {
            Ok(parts) => parts,
            Err(e) => {
                error!("[WIFI] Controller init failed: {:?}", e);
                halt(AppError::Wifi).await
            }
        };
    let client_config = ClientConfig::default()
        .with_ssid(secrets::WIFI_SSID.into())
        .with_password(secrets::WIFI_PASSWORD.into());
    if let Err(e) = wifi_controller.set_config(&ModeConfig::Client(client_config)) {
        error!("[WIFI] Mode config rejected: {:?}", e);
        halt(AppError::Wifi).await
    }

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::<4>::new()),
        seed,
    );
    spawner.spawn(net_task(runner).expect("net_task spawn"));

    // Sensors
    let i2c = match app_state::create_i2c_bus(
        peripherals.I2C0,
        peripherals.GPIO12,
        peripherals.GPIO11,
    ) {
        Ok(i2c) => i2c,
        Err(e) => halt(e).await,
    };
    let bus = app_state::share_i2c_bus(i2c);

    let scd30_interval = logger_config
        .timing
        .sample_interval_sec
        .clamp(SCD30_INTERVAL_RANGE.0, SCD30_INTERVAL_RANGE.1) as u16;
    let mut instruments = Instruments::new(
        Sps30::new(SharedI2cDevice::new(bus), Delay),
        Bme280Sensor::new(SharedI2cDevice::new(bus), Delay),
        Scd30::new(SharedI2cDevice::new(bus), Delay, scd30_interval),
        Sgp40::new(SharedI2cDevice::new(bus), Delay),
        GasIndexVoc::new(logger_config.timing.sample_interval_sec as f32),
        Delay,
        logger_config.co2_policy,
    );
    let sensors = instruments.init().await;
    if !(sensors.pm && sensors.climate && sensors.co2 && sensors.voc) {
        warn!("[APP] Some sensors failed to initialize: {:?}", sensors);
    }

    // Storage
    let sd_spi = match app_state::create_sd_spi(
        peripherals.SPI2,
        peripherals.GPIO36,
        peripherals.GPIO37,
        peripherals.GPIO35,
        peripherals.GPIO4,
    ) {
        Ok(spi) => spi,
        Err(e) => halt(e).await,
    };
    let sd_card = app_state::init_spi_hardware(sd_spi, Delay);
    let offset = logger_config.utc_offset();
    let storage = SdCardStorage::new(sd_card, ClockTimeSource::new(&CLOCK, offset));
    let log = LogStore::new(storage, &CLOCK, offset);

    // Wi-Fi and time must be up before the first timestamped line
    run_state.enter(AppRunState::WifiConnecting);
    while !wifi::connect(&mut wifi_controller, stack, wifi::BOOT_ATTEMPTS).await {
        Timer::after(TIME_SYNC_RETRY).await;
    }

    run_state.enter(AppRunState::TimeSyncing);
    loop {
        match sntp::fetch_time(stack).await {
            Ok(unix) => {
                CLOCK.set(unix);
                break;
            }
            Err(e) => {
                warn!("[TIME] Sync failed: {}", e);
                Timer::after(TIME_SYNC_RETRY).await;
                wifi::ensure_connected(&mut wifi_controller, stack).await;
            }
        }
    }
    info!("[TIME] Clock synced, unix {}", CLOCK.now());

    let tcp_state = TCP_STATE.init(TcpState::new());
    let uplink = HttpUplink::new(stack, tcp_state, HTTP_BUFFERS.take(), seed ^ 0xA5A5_5A5A);
    let mut station = Station::new(instruments, log, uplink, logger_config);

    if !station.boot() {
        warn!("[SD] Card unavailable, logging to RTT only");
    }
    log_update(station.check_update().await);

    loop {
        run_state.enter(AppRunState::Waiting);
        let wait = station.seconds_to_next_send();
        info!("[APP] Next send in {} s", wait);
        Timer::after(Duration::from_secs(wait)).await;

        let online = wifi::ensure_connected(&mut wifi_controller, stack).await;
        run_state.enter(if online {
            AppRunState::Measuring
        } else {
            AppRunState::Offline
        });

        let report = station.run_cycle(online).await;
        info!(
            "[APP] Cycle {}: {:?}, queue cleared {:?}, mirrored {}",
            report.cycle, report.delivery, report.queue_cleared, report.mirrored
        );

        log_update(station.maybe_check_update(online).await);
    }
}
