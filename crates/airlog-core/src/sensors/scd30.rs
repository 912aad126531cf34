//! Sensirion SCD30 CO2 / temperature / humidity sensor.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, info};

use super::{Co2Readings, Lifecycle, Sensor, SensorError};
use crate::crc::{self, crc8};

pub const SCD30_ADDRESS: u8 = 0x61;

const CMD_START_CONTINUOUS: u16 = 0x0010;
const CMD_STOP_CONTINUOUS: u16 = 0x0104;
const CMD_SET_INTERVAL: u16 = 0x4600;
const CMD_DATA_READY: u16 = 0x0202;
const CMD_READ_MEASUREMENT: u16 = 0x0300;

/// Three floats, each as two CRC-checked words.
const MEASUREMENT_LEN: usize = 18;

/// The sensor cannot sleep; slowing it down is the closest thing.
const IDLE_INTERVAL_SEC: u16 = 60;

/// Minimum gap between a command write and the following read.
const READ_DELAY_MS: u32 = 3;

const SENSOR: &str = "SCD30";

pub struct Scd30<I, D> {
    i2c: I,
    delay: D,
    interval_sec: u16,
    ambient_pressure_mbar: u16,
    last_co2: Option<f32>,
}

impl<I: I2c, D: DelayNs> Scd30<I, D> {
    pub fn new(i2c: I, delay: D, interval_sec: u16) -> Self {
        Self {
            i2c,
            delay,
            interval_sec,
            ambient_pressure_mbar: 0,
            last_co2: None,
        }
    }

    /// Pressure compensation sent with the next start, in mbar. 0 disables it.
    pub fn set_ambient_pressure(&mut self, mbar: u16) {
        self.ambient_pressure_mbar = mbar;
    }

    /// Last CO2 value that was read successfully.
    pub fn last_co2(&self) -> Option<f32> {
        self.last_co2
    }

    async fn command(&mut self, opcode: u16, operation: &'static str) -> Result<(), SensorError> {
        self.i2c
            .write(SCD30_ADDRESS, &opcode.to_be_bytes())
            .await
            .map_err(|e| {
                debug!("[SCD30] {} not acknowledged: {:?}", operation, e);
                SensorError::Bus {
                    sensor: SENSOR,
                    operation,
                }
            })
    }

    async fn command_with_argument(
        &mut self,
        opcode: u16,
        argument: u16,
        operation: &'static str,
    ) -> Result<(), SensorError> {
        let [hi, lo] = opcode.to_be_bytes();
        let [arg_hi, arg_lo] = argument.to_be_bytes();
        let frame = [hi, lo, arg_hi, arg_lo, crc8(arg_hi, arg_lo)];
        self.i2c
            .write(SCD30_ADDRESS, &frame)
            .await
            .map_err(|_| SensorError::Bus {
                sensor: SENSOR,
                operation,
            })
    }

    async fn read_into(&mut self, buf: &mut [u8], operation: &'static str) -> Result<(), SensorError> {
        self.delay.delay_ms(READ_DELAY_MS).await;
        self.i2c
            .read(SCD30_ADDRESS, buf)
            .await
            .map_err(|_| SensorError::Bus {
                sensor: SENSOR,
                operation,
            })
    }

    pub async fn set_measurement_interval(&mut self, seconds: u16) -> Result<(), SensorError> {
        self.command_with_argument(CMD_SET_INTERVAL, seconds, "set interval")
            .await
    }

    pub async fn data_ready(&mut self) -> Result<bool, SensorError> {
        self.command(CMD_DATA_READY, "data ready").await?;
        let mut word = [0u8; crc::WORD_LEN];
        self.read_into(&mut word, "data ready").await?;
        if !crc::check_word(&word) {
            return Err(SensorError::Checksum {
                sensor: SENSOR,
                operation: "data ready",
            });
        }
        Ok(word[1] == 0x01)
    }
}

/// Decode one float from two CRC-checked words.
fn decode_float(group: &[u8]) -> Option<f32> {
    if !crc::check_word(&group[0..3]) || !crc::check_word(&group[3..6]) {
        return None;
    }
    Some(f32::from_be_bytes([group[0], group[1], group[3], group[4]]))
}

impl<I: I2c, D: DelayNs> Lifecycle for Scd30<I, D> {
    async fn init(&mut self) -> Result<(), SensorError> {
        self.set_measurement_interval(self.interval_sec).await?;
        info!("[SCD30] Measurement interval set to {} s", self.interval_sec);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SensorError> {
        self.command_with_argument(
            CMD_START_CONTINUOUS,
            self.ambient_pressure_mbar,
            "start continuous",
        )
        .await?;
        self.set_measurement_interval(self.interval_sec).await
    }

    async fn stop(&mut self) -> Result<(), SensorError> {
        self.command(CMD_STOP_CONTINUOUS, "stop continuous").await
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.set_measurement_interval(IDLE_INTERVAL_SEC).await
    }
}

impl<I: I2c, D: DelayNs> Sensor for Scd30<I, D> {
    type Readings = Co2Readings;

    async fn read(&mut self) -> Result<Co2Readings, SensorError> {
        if !self.data_ready().await? {
            return Err(SensorError::NotReady { sensor: SENSOR });
        }

        self.command(CMD_READ_MEASUREMENT, "read measurement").await?;
        let mut raw = [0u8; MEASUREMENT_LEN];
        self.read_into(&mut raw, "read measurement").await?;

        let checksum = SensorError::Checksum {
            sensor: SENSOR,
            operation: "read measurement",
        };
        let co2_ppm = decode_float(&raw[0..6]).ok_or(checksum)?;
        let temperature_celsius = decode_float(&raw[6..12]).ok_or(checksum)?;
        let humidity_percent = decode_float(&raw[12..18]).ok_or(checksum)?;

        self.last_co2 = Some(co2_ppm);
        Ok(Co2Readings {
            co2_ppm,
            temperature_celsius,
            humidity_percent,
        })
    }
}
