//! Sensor drivers and the trait seam the sampler talks to.
//!
//! Each physical sensor is one owned driver instance. Drivers expose the same
//! lifecycle (`init`/`start`/`stop`/`sleep`) plus a typed `read`, so the
//! sampler can be exercised against fakes on the host.

#[cfg(feature = "sensor-bme280")]
pub mod bme280;
pub mod scd30;
pub mod sgp40;
pub mod sps30;
pub mod voc;

use thiserror_no_std::Error;

#[cfg(feature = "sensor-bme280")]
pub use bme280::Bme280Sensor;
pub use scd30::Scd30;
pub use sgp40::Sgp40;
pub use sps30::Sps30;
pub use voc::{GasIndexVoc, VocAlgorithm};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: I2C transfer failed during {operation}")]
    Bus {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: CRC mismatch in {operation}")]
    Checksum {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: no new data ready")]
    NotReady { sensor: &'static str },
    #[error("{sensor}: initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
}

/// Power/measurement lifecycle shared by every driver.
///
/// Sensors without a matching command keep the default no-op.
pub trait Lifecycle {
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    fn start(&mut self) -> impl Future<Output = Result<(), SensorError>> {
        async { Ok(()) }
    }

    fn stop(&mut self) -> impl Future<Output = Result<(), SensorError>> {
        async { Ok(()) }
    }

    fn sleep(&mut self) -> impl Future<Output = Result<(), SensorError>> {
        async { Ok(()) }
    }
}

/// Trait for sensors that produce typed readings without extra input.
pub trait Sensor: Lifecycle {
    /// The type of readings this sensor produces.
    type Readings;

    /// Read the sensor and return typed readings.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}

/// Gas sensors whose raw signal needs live humidity/temperature compensation.
pub trait RawVocSensor: Lifecycle {
    fn measure_raw(
        &mut self,
        humidity_percent: f32,
        temperature_celsius: f32,
    ) -> impl Future<Output = Result<u16, SensorError>>;
}

/// Mass concentrations in µg/m³. A value of [`sps30::PM_INVALID`] marks a
/// float whose CRC check failed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PmReadings {
    pub pm1: f32,
    pub pm2_5: f32,
    pub pm10: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClimateReadings {
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
    pub pressure_hpa: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Co2Readings {
    pub co2_ppm: f32,
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
}
