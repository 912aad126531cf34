//! Simulated I2C bus speaking the SPS30, SCD30 and SGP40 command sets.
//!
//! Each device answers the next read with whatever its last command queued,
//! framed as Sensirion words with CRC. Every `crc_fault_every`-th response is
//! corrupted so the drivers' checksum paths get exercised.

use std::collections::HashMap;

use airlog_core::crc::{self, encode_word};
use airlog_core::sensors::scd30::SCD30_ADDRESS;
use airlog_core::sensors::sgp40::SGP40_ADDRESS;
use airlog_core::sensors::sps30::SPS30_ADDRESS;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};
use log::{debug, warn};

use crate::sim_clock::SimClock;

/// Smooth synthetic signal: `base` plus two sines of different periods.
fn wave(t: f64, base: f64, amplitude: f64, period: f64) -> f32 {
    (base + amplitude * (t / period).sin() + 0.1 * amplitude * (t / (period * 0.31)).cos()) as f32
}

fn push_float(out: &mut Vec<u8>, value: f32) {
    let [b0, b1, b2, b3] = value.to_be_bytes();
    out.extend_from_slice(&[b0, b1, crc::crc8(b0, b1), b2, b3, crc::crc8(b2, b3)]);
}

/// Mass concentrations at `t` as `(pm1, pm2_5, pm10)`.
fn pm_values(t: f64) -> (f32, f32, f32) {
    let pm1 = wave(t, 6.0, 3.0, 900.0);
    let pm2_5 = pm1 * 1.6;
    (pm1, pm2_5, pm2_5 * 1.3)
}

/// SPS30 measurement block. The logger decodes PM10 from byte offset 12, the
/// third float, so that slot carries the PM10 value.
fn pm_block(t: f64) -> Vec<u8> {
    let (pm1, pm2_5, pm10) = pm_values(t);
    let mut block = Vec::with_capacity(60);
    for value in [
        pm1,
        pm2_5,
        pm10,
        pm10 * 1.05,
        pm1 * 7.0,
        pm1 * 8.0,
        pm2_5 * 5.0,
        pm10 * 4.0,
        pm10 * 3.5,
        0.6,
    ] {
        push_float(&mut block, value);
    }
    block
}

fn opcode(bytes: &[u8]) -> Option<u16> {
    match bytes {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// Argument word following the opcode, if present and CRC-valid.
fn argument(bytes: &[u8]) -> Option<u16> {
    let word = bytes.get(2..5)?;
    crc::check_word(word).then(|| u16::from_be_bytes([word[0], word[1]]))
}

#[derive(Default)]
struct Sps30Model {
    measuring: bool,
    sleeping: bool,
}

struct Scd30Model {
    measuring: bool,
    interval_sec: u16,
    last_sample: f64,
}

pub struct SimI2cBus {
    clock: SimClock,
    crc_fault_every: u32,
    responses: u32,
    pending: HashMap<u8, Vec<u8>>,
    sps30: Sps30Model,
    scd30: Scd30Model,
}

impl SimI2cBus {
    pub fn new(clock: SimClock, crc_fault_every: u32) -> Self {
        Self {
            clock,
            crc_fault_every,
            responses: 0,
            pending: HashMap::new(),
            sps30: Sps30Model::default(),
            scd30: Scd30Model {
                measuring: false,
                interval_sec: 2,
                last_sample: f64::NEG_INFINITY,
            },
        }
    }

    fn nack() -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)
    }

    fn on_write(&mut self, address: u8, bytes: &[u8]) -> Result<(), ErrorKind> {
        let Some(op) = opcode(bytes) else {
            return Err(Self::nack());
        };
        match address {
            SPS30_ADDRESS => self.sps30_command(op, bytes),
            SCD30_ADDRESS => self.scd30_command(op, bytes),
            SGP40_ADDRESS => self.sgp40_command(op, bytes),
            _ => Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
        }
    }

    fn sps30_command(&mut self, op: u16, bytes: &[u8]) -> Result<(), ErrorKind> {
        let sps = &mut self.sps30;
        if sps.sleeping && op != 0x1103 {
            return Err(Self::nack());
        }
        match op {
            0x1103 => sps.sleeping = false,
            0x0010 => {
                argument(bytes).ok_or_else(Self::nack)?;
                sps.measuring = true;
            }
            0x0104 => sps.measuring = false,
            0x1001 => {
                sps.measuring = false;
                sps.sleeping = true;
            }
            0x0202 => {
                let ready = u16::from(sps.measuring);
                self.pending
                    .insert(SPS30_ADDRESS, encode_word(ready).to_vec());
            }
            0x0300 => {
                let block = pm_block(self.clock.elapsed_secs());
                self.pending.insert(SPS30_ADDRESS, block);
            }
            _ => {
                warn!("[SIM] SPS30 unknown opcode {:#06x}", op);
                return Err(Self::nack());
            }
        }
        Ok(())
    }

    fn scd30_command(&mut self, op: u16, bytes: &[u8]) -> Result<(), ErrorKind> {
        let now = self.clock.elapsed_secs();
        let scd = &mut self.scd30;
        match op {
            0x0010 => {
                argument(bytes).ok_or_else(Self::nack)?;
                scd.measuring = true;
            }
            0x0104 => scd.measuring = false,
            0x4600 => scd.interval_sec = argument(bytes).ok_or_else(Self::nack)?,
            0x0202 => {
                let ready =
                    scd.measuring && now - scd.last_sample >= f64::from(scd.interval_sec);
                self.pending
                    .insert(SCD30_ADDRESS, encode_word(u16::from(ready)).to_vec());
            }
            0x0300 => {
                scd.last_sample = now;
                let mut block = Vec::with_capacity(18);
                push_float(&mut block, wave(now, 650.0, 180.0, 1800.0));
                push_float(&mut block, wave(now, 22.0, 2.0, 2400.0));
                push_float(&mut block, wave(now, 45.0, 8.0, 3000.0));
                self.pending.insert(SCD30_ADDRESS, block);
            }
            _ => {
                warn!("[SIM] SCD30 unknown opcode {:#06x}", op);
                return Err(Self::nack());
            }
        }
        Ok(())
    }

    fn sgp40_command(&mut self, op: u16, bytes: &[u8]) -> Result<(), ErrorKind> {
        match op {
            0x280E => {
                self.pending
                    .insert(SGP40_ADDRESS, encode_word(0xD400).to_vec());
            }
            0x260F => {
                let compensation_ok = bytes.len() == 8
                    && crc::check_word(&bytes[2..5])
                    && crc::check_word(&bytes[5..8]);
                if !compensation_ok {
                    return Err(Self::nack());
                }
                let t = self.clock.elapsed_secs();
                let sraw = wave(t, 30_000.0, 1_500.0, 1200.0) as u16;
                self.pending.insert(SGP40_ADDRESS, encode_word(sraw).to_vec());
            }
            0x3615 => {}
            _ => {
                warn!("[SIM] SGP40 unknown opcode {:#06x}", op);
                return Err(Self::nack());
            }
        }
        Ok(())
    }

    fn on_read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), ErrorKind> {
        let Some(mut response) = self.pending.remove(&address) else {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        };
        if response.len() != buf.len() {
            return Err(ErrorKind::Other);
        }

        self.responses = self.responses.wrapping_add(1);
        if self.crc_fault_every > 0 && self.responses % self.crc_fault_every == 0 {
            debug!("[SIM] Corrupting response from {:#04x}", address);
            response[2] ^= 0xA5;
        }

        buf.copy_from_slice(&response);
        Ok(())
    }
}

impl ErrorType for SimI2cBus {
    type Error = ErrorKind;
}

impl I2c for SimI2cBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                Operation::Write(bytes) => self.on_write(address, bytes)?,
                Operation::Read(buf) => self.on_read(address, buf)?,
            }
        }
        Ok(())
    }
}
