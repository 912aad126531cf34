//! Hardware initialization for the logger board
//!
//! Sensors share I2C0 on GPIO12 (SDA) / GPIO11 (SCL). The SD card sits alone
//! on SPI2.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::Delay;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::{Async, Blocking};
use log::{error, info};
use static_cell::StaticCell;

use super::AppError;

pub type SensorBus = AsyncMutex<CriticalSectionRawMutex, I2c<'static, Async>>;
pub type SdSpiDevice = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;

/// SCD30 tops out at 100 kHz.
const I2C_FREQUENCY_KHZ: u32 = 100;
/// Card initialization must run at 400 kHz or below.
const SD_FREQUENCY_KHZ: u32 = 400;

/// Create the sensor I2C peripheral.
pub fn create_i2c_bus(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO12<'static>,
    scl: esp_hal::peripherals::GPIO11<'static>,
) -> Result<I2c<'static, Async>, AppError> {
    let i2c = I2c::new(
        i2c0,
        I2cConfig::default().with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ)),
    )
    .map_err(|e| {
        error!("[I2C] Config rejected: {:?}", e);
        AppError::I2cBus
    })?;

    Ok(i2c.with_sda(sda).with_scl(scl).into_async())
}

/// Park the I2C peripheral behind a mutex that every sensor driver shares.
pub fn share_i2c_bus(i2c: I2c<'static, Async>) -> &'static SensorBus {
    static I2C0_BUS: StaticCell<SensorBus> = StaticCell::new();
    let bus = I2C0_BUS.init(AsyncMutex::new(i2c));
    info!("[I2C] Sensor bus ready at {} kHz", I2C_FREQUENCY_KHZ);
    bus
}

/// Create the SD card's SPI device with its own chip-select.
pub fn create_sd_spi(
    spi2: esp_hal::peripherals::SPI2<'static>,
    sck: esp_hal::peripherals::GPIO36<'static>,
    mosi: esp_hal::peripherals::GPIO37<'static>,
    miso: esp_hal::peripherals::GPIO35<'static>,
    cs: esp_hal::peripherals::GPIO4<'static>,
) -> Result<SdSpiDevice, AppError> {
    let spi = Spi::new(
        spi2,
        SpiConfig::default().with_frequency(Rate::from_khz(SD_FREQUENCY_KHZ)),
    )
    .map_err(|e| {
        error!("[SD] SPI config rejected: {:?}", e);
        AppError::SpiBus
    })?
    .with_sck(sck)
    .with_mosi(mosi)
    .with_miso(miso);

    let cs = Output::new(cs, Level::High, OutputConfig::default());

    ExclusiveDevice::new(spi, cs, Delay).map_err(|_| AppError::SpiBus)
}

/// Wrap an SPI device as an SD card.
pub fn init_spi_hardware<S, D>(sd_card_spi: S, delay: D) -> embedded_sdmmc::SdCard<S, D>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
{
    embedded_sdmmc::SdCard::new(sd_card_spi, delay)
}
