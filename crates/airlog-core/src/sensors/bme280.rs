use bme280_rs::{AsyncBme280, Configuration, Oversampling, SensorMode};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{error, info};

use super::{ClimateReadings, Lifecycle, Sensor, SensorError};

pub const BME280_ADDRESS: u8 = 0x76;

const SENSOR: &str = "BME280";

fn sampling(mode: SensorMode) -> Configuration {
    Configuration::default()
        .with_temperature_oversampling(Oversampling::Oversample1)
        .with_humidity_oversampling(Oversampling::Oversample1)
        .with_pressure_oversampling(Oversampling::Oversample1)
        .with_sensor_mode(mode)
}

/// BME280 temperature / humidity / pressure sensor
pub struct Bme280Sensor<I, D> {
    sensor: AsyncBme280<I, D>,
}

impl<I, D> Bme280Sensor<I, D>
where
    I: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            sensor: AsyncBme280::new_with_address(i2c, BME280_ADDRESS, delay),
        }
    }

    async fn set_mode(&mut self, mode: SensorMode, operation: &'static str) -> Result<(), SensorError> {
        self.sensor
            .set_sampling_configuration(sampling(mode))
            .await
            .map_err(|_| SensorError::Bus {
                sensor: SENSOR,
                operation,
            })
    }
}

impl<I, D> Lifecycle for Bme280Sensor<I, D>
where
    I: I2c,
    D: DelayNs,
{
    async fn init(&mut self) -> Result<(), SensorError> {
        if let Err(e) = self.sensor.init().await {
            error!("[BME280] Failed to initialize: {:?}", e);
            return Err(SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "calibration read failed",
            });
        }
        self.set_mode(SensorMode::Normal, "configure").await?;
        info!("[BME280] Initialized");
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SensorError> {
        self.set_mode(SensorMode::Normal, "wake").await
    }

    async fn stop(&mut self) -> Result<(), SensorError> {
        self.set_mode(SensorMode::Sleep, "sleep").await
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.set_mode(SensorMode::Sleep, "sleep").await
    }
}

impl<I, D> Sensor for Bme280Sensor<I, D>
where
    I: I2c,
    D: DelayNs,
{
    type Readings = ClimateReadings;

    async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
        let bus = |operation| SensorError::Bus {
            sensor: SENSOR,
            operation,
        };
        let missing = SensorError::NotReady { sensor: SENSOR };

        let temperature_celsius = self
            .sensor
            .read_temperature()
            .await
            .map_err(|_| bus("read temperature"))?
            .ok_or(missing)?;
        let humidity_percent = self
            .sensor
            .read_humidity()
            .await
            .map_err(|_| bus("read humidity"))?
            .ok_or(missing)?;
        let pressure_pa = self
            .sensor
            .read_pressure()
            .await
            .map_err(|_| bus("read pressure"))?
            .ok_or(missing)?;

        Ok(ClimateReadings {
            temperature_celsius,
            humidity_percent,
            pressure_hpa: pressure_pa / 100.0,
        })
    }
}
