//! Simulated BME280.
//!
//! The real driver talks to the chip's register map through `bme280-rs`;
//! here the readings are synthesized directly at the sensor trait.

use airlog_core::sensors::{ClimateReadings, Lifecycle, Sensor, SensorError};

use crate::sim_clock::SimClock;

pub struct SimBme280 {
    clock: SimClock,
    asleep: bool,
}

impl SimBme280 {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            asleep: false,
        }
    }
}

impl Lifecycle for SimBme280 {
    async fn init(&mut self) -> Result<(), SensorError> {
        self.asleep = false;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SensorError> {
        self.asleep = false;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SensorError> {
        self.asleep = true;
        Ok(())
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.asleep = true;
        Ok(())
    }
}

impl Sensor for SimBme280 {
    type Readings = ClimateReadings;

    async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
        if self.asleep {
            return Err(SensorError::NotReady { sensor: "BME280" });
        }

        let t = self.clock.elapsed_secs();

        // Temperature: 20–26 °C sinusoidal with slow drift
        let temperature = 23.0 + 3.0 * (t / 2400.0).sin() + 0.5 * (t / 370.0).cos();
        // Humidity: 40–60 % with a different period
        let humidity = 50.0 + 10.0 * (t / 3600.0).sin() + 2.0 * (t / 230.0).cos();
        // Pressure: 1005–1021 hPa, slow weather front
        let pressure = 1013.0 + 8.0 * (t / 7200.0).sin();

        Ok(ClimateReadings {
            temperature_celsius: temperature as f32,
            humidity_percent: humidity as f32,
            pressure_hpa: pressure as f32,
        })
    }
}
