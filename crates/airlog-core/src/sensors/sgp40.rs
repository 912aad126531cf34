//! Sensirion SGP40 VOC sensor.
//!
//! Only the raw signal is read here; turning it into an index is the job of a
//! [`super::VocAlgorithm`].

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, info};

use super::{Lifecycle, RawVocSensor, SensorError};
use crate::crc::{self, encode_word};

pub const SGP40_ADDRESS: u8 = 0x59;

const CMD_MEASURE_RAW: u16 = 0x260F;
const CMD_HEATER_OFF: u16 = 0x3615;
const CMD_SELF_TEST: u16 = 0x280E;

/// Self test passes when the result word is 0xD400.
const SELF_TEST_OK: u16 = 0xD400;

const MEASURE_DELAY_MS: u32 = 30;
const SELF_TEST_DELAY_MS: u32 = 320;

const SENSOR: &str = "SGP40";

/// Humidity compensation argument in sensor ticks.
pub fn humidity_ticks(humidity_percent: f32) -> u16 {
    ((humidity_percent.clamp(0.0, 100.0) / 100.0) * 65535.0) as u16
}

/// Temperature compensation argument in sensor ticks.
pub fn temperature_ticks(temperature_celsius: f32) -> u16 {
    (((temperature_celsius.clamp(-45.0, 130.0) + 45.0) / 175.0) * 65535.0) as u16
}

/// Build the 8-byte measure-raw command with compensation words.
pub fn measure_raw_frame(humidity_percent: f32, temperature_celsius: f32) -> [u8; 8] {
    let [op_hi, op_lo] = CMD_MEASURE_RAW.to_be_bytes();
    let hum = encode_word(humidity_ticks(humidity_percent));
    let temp = encode_word(temperature_ticks(temperature_celsius));
    [
        op_hi, op_lo, hum[0], hum[1], hum[2], temp[0], temp[1], temp[2],
    ]
}

pub struct Sgp40<I, D> {
    i2c: I,
    delay: D,
}

impl<I: I2c, D: DelayNs> Sgp40<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self { i2c, delay }
    }

    async fn command(&mut self, bytes: &[u8], operation: &'static str) -> Result<(), SensorError> {
        self.i2c.write(SGP40_ADDRESS, bytes).await.map_err(|e| {
            debug!("[SGP40] {} not acknowledged: {:?}", operation, e);
            SensorError::Bus {
                sensor: SENSOR,
                operation,
            }
        })
    }

    async fn read_word(&mut self, operation: &'static str) -> Result<u16, SensorError> {
        let mut word = [0u8; crc::WORD_LEN];
        self.i2c
            .read(SGP40_ADDRESS, &mut word)
            .await
            .map_err(|_| SensorError::Bus {
                sensor: SENSOR,
                operation,
            })?;
        if !crc::check_word(&word) {
            return Err(SensorError::Checksum {
                sensor: SENSOR,
                operation,
            });
        }
        Ok(u16::from_be_bytes([word[0], word[1]]))
    }

    pub async fn self_test(&mut self) -> Result<bool, SensorError> {
        self.command(&CMD_SELF_TEST.to_be_bytes(), "self test").await?;
        self.delay.delay_ms(SELF_TEST_DELAY_MS).await;
        let result = self.read_word("self test").await?;
        Ok(result == SELF_TEST_OK)
    }
}

impl<I: I2c, D: DelayNs> Lifecycle for Sgp40<I, D> {
    async fn init(&mut self) -> Result<(), SensorError> {
        if self.self_test().await? {
            info!("[SGP40] Self test passed");
            Ok(())
        } else {
            Err(SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "self test reported a fault",
            })
        }
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.command(&CMD_HEATER_OFF.to_be_bytes(), "heater off").await
    }
}

impl<I: I2c, D: DelayNs> RawVocSensor for Sgp40<I, D> {
    async fn measure_raw(
        &mut self,
        humidity_percent: f32,
        temperature_celsius: f32,
    ) -> Result<u16, SensorError> {
        let frame = measure_raw_frame(humidity_percent, temperature_celsius);
        self.command(&frame, "measure raw").await?;
        self.delay.delay_ms(MEASURE_DELAY_MS).await;
        self.read_word("measure raw").await
    }
}
