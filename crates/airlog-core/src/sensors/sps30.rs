//! Sensirion SPS30 particulate matter sensor over I2C.
//!
//! Commands are a big-endian 16-bit opcode, optionally followed by one
//! argument word and its CRC. Measurements come back as ten big-endian
//! IEEE-754 floats, each split into two CRC-checked words (6 bytes per float).

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{debug, info, warn};

use super::{Lifecycle, PmReadings, Sensor, SensorError};
use crate::crc::{self, crc8};

pub const SPS30_ADDRESS: u8 = 0x69;

/// Start-measurement argument selecting big-endian IEEE-754 float output.
pub const OUTPUT_FORMAT_FLOAT: u16 = 0x0300;

/// Length of the measured-values block: 10 floats × (4 data + 2 CRC) bytes.
pub const MEASUREMENT_LEN: usize = 60;

/// Bytes per float on the wire.
pub const FLOAT_GROUP_LEN: usize = 6;

/// Number of floats in one measured-values block.
pub const FLOAT_COUNT: usize = MEASUREMENT_LEN / FLOAT_GROUP_LEN;

/// Reported for a float whose CRC check failed. Not clamped to zero.
pub const PM_INVALID: f32 = -1.0;

const SENSOR: &str = "SPS30";

const WAKE_ATTEMPTS: usize = 3;
const BOOT_DELAY_MS: u32 = 100;
const WAKE_SETTLE_MS: u32 = 100;
const WAKE_BACKOFF_MS: u32 = 200;
const FAN_SETTLE_MS: u32 = 50;
const DATA_READY_DELAY_MS: u32 = 20;
const READ_VALUES_DELAY_MS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    StartMeasurement = 0x0010,
    StopMeasurement = 0x0104,
    ReadDataReady = 0x0202,
    ReadMeasuredValues = 0x0300,
    Sleep = 0x1001,
    WakeUp = 0x1103,
}

impl Command {
    pub const fn opcode(self) -> u16 {
        self as u16
    }
}

/// One I2C write: opcode, plus an optional argument word and its CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; 5],
    len: usize,
}

impl Frame {
    pub fn command(command: Command) -> Self {
        let [hi, lo] = command.opcode().to_be_bytes();
        Self {
            bytes: [hi, lo, 0, 0, 0],
            len: 2,
        }
    }

    pub fn with_argument(command: Command, argument: u16) -> Self {
        let [hi, lo] = command.opcode().to_be_bytes();
        let [arg_hi, arg_lo] = argument.to_be_bytes();
        Self {
            bytes: [hi, lo, arg_hi, arg_lo, crc8(arg_hi, arg_lo)],
            len: 5,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Driver state as tracked on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sps30State {
    Uninitialized,
    Idle,
    Measuring,
    Sleeping,
}

/// Decode one 6-byte float group, or [`PM_INVALID`] when either word fails
/// its CRC check.
pub fn decode_float(group: &[u8]) -> f32 {
    if group.len() < FLOAT_GROUP_LEN {
        return PM_INVALID;
    }
    if !crc::check_word(&group[0..3]) || !crc::check_word(&group[3..6]) {
        return PM_INVALID;
    }
    f32::from_be_bytes([group[0], group[1], group[3], group[4]])
}

/// All ten floats of a measured-values block, each validated independently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementBlock {
    values: [f32; FLOAT_COUNT],
}

impl MeasurementBlock {
    pub fn decode(raw: &[u8; MEASUREMENT_LEN]) -> Self {
        let mut values = [PM_INVALID; FLOAT_COUNT];
        for (value, group) in values.iter_mut().zip(raw.chunks_exact(FLOAT_GROUP_LEN)) {
            *value = decode_float(group);
        }
        Self { values }
    }

    /// Float at position `index` (0-based) in the block.
    pub fn value(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    /// PM1.0, PM2.5 and PM10 from the first three floats (byte offsets 0, 6, 12).
    pub fn pm_readings(&self) -> PmReadings {
        PmReadings {
            pm1: self.values[0],
            pm2_5: self.values[1],
            pm10: self.values[2],
        }
    }
}

pub struct Sps30<I, D> {
    i2c: I,
    delay: D,
    state: Sps30State,
}

impl<I: I2c, D: DelayNs> Sps30<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            i2c,
            delay,
            state: Sps30State::Uninitialized,
        }
    }

    pub fn state(&self) -> Sps30State {
        self.state
    }

    async fn send(&mut self, frame: &Frame, operation: &'static str) -> Result<(), SensorError> {
        self.i2c
            .write(SPS30_ADDRESS, frame.as_bytes())
            .await
            .map_err(|e| {
                debug!("[SPS30] {} not acknowledged: {:?}", operation, e);
                SensorError::Bus {
                    sensor: SENSOR,
                    operation,
                }
            })
    }

    async fn receive(&mut self, buf: &mut [u8], operation: &'static str) -> Result<(), SensorError> {
        self.i2c.read(SPS30_ADDRESS, buf).await.map_err(|e| {
            debug!("[SPS30] {} read failed: {:?}", operation, e);
            SensorError::Bus {
                sensor: SENSOR,
                operation,
            }
        })
    }

    pub async fn wake_up(&mut self) -> Result<(), SensorError> {
        self.send(&Frame::command(Command::WakeUp), "wake up").await?;
        self.state = Sps30State::Idle;
        Ok(())
    }

    /// Poll the data-ready flag. A CRC mismatch on the flag word is an error.
    pub async fn data_ready(&mut self) -> Result<bool, SensorError> {
        self.send(&Frame::command(Command::ReadDataReady), "read data-ready flag")
            .await?;
        self.delay.delay_ms(DATA_READY_DELAY_MS).await;

        let mut word = [0u8; crc::WORD_LEN];
        self.receive(&mut word, "read data-ready flag").await?;

        if !crc::check_word(&word) {
            return Err(SensorError::Checksum {
                sensor: SENSOR,
                operation: "data-ready flag",
            });
        }
        Ok(word[1] != 0x00)
    }

    /// Fetch and decode the full measured-values block.
    pub async fn read_block(&mut self) -> Result<MeasurementBlock, SensorError> {
        self.send(
            &Frame::command(Command::ReadMeasuredValues),
            "read measured values",
        )
        .await?;
        self.delay.delay_ms(READ_VALUES_DELAY_MS).await;

        let mut raw = [0u8; MEASUREMENT_LEN];
        self.receive(&mut raw, "read measured values").await?;

        Ok(MeasurementBlock::decode(&raw))
    }
}

impl<I: I2c, D: DelayNs> Lifecycle for Sps30<I, D> {
    /// Wake the sensor, retrying a few times.
    ///
    /// Always succeeds: a sensor that never acknowledges may already be awake,
    /// and a dead sensor shows up later as failed reads.
    async fn init(&mut self) -> Result<(), SensorError> {
        self.delay.delay_ms(BOOT_DELAY_MS).await;

        for attempt in 1..=WAKE_ATTEMPTS {
            if self.wake_up().await.is_ok() {
                self.delay.delay_ms(WAKE_SETTLE_MS).await;
                info!("[SPS30] Awake after {} attempt(s)", attempt);
                return Ok(());
            }
            self.delay.delay_ms(WAKE_BACKOFF_MS).await;
        }

        warn!("[SPS30] Wake-up not acknowledged, assuming sensor is already awake");
        self.delay.delay_ms(WAKE_SETTLE_MS).await;
        self.state = Sps30State::Idle;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SensorError> {
        let frame = Frame::with_argument(Command::StartMeasurement, OUTPUT_FORMAT_FLOAT);
        self.send(&frame, "start measurement").await?;

        // Fan spin-up
        self.delay.delay_ms(FAN_SETTLE_MS).await;
        self.state = Sps30State::Measuring;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SensorError> {
        self.send(&Frame::command(Command::StopMeasurement), "stop measurement")
            .await?;
        self.state = Sps30State::Idle;
        Ok(())
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.send(&Frame::command(Command::Sleep), "sleep").await?;
        self.state = Sps30State::Sleeping;
        Ok(())
    }
}

impl<I: I2c, D: DelayNs> Sensor for Sps30<I, D> {
    type Readings = PmReadings;

    /// Two-phase read: data-ready poll, then the measured-values block.
    ///
    /// Bus errors abort the whole read. CRC failures inside the block only
    /// invalidate the affected float (reported as [`PM_INVALID`]).
    async fn read(&mut self) -> Result<PmReadings, SensorError> {
        if !self.data_ready().await? {
            return Err(SensorError::NotReady { sensor: SENSOR });
        }
        let block = self.read_block().await?;
        Ok(block.pm_readings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::encode_word;
    use crate::testing::{FakeI2c, RecordingDelay};
    use embassy_futures::block_on;
    use embedded_hal::i2c::ErrorKind;

    fn encode_float(value: f32) -> [u8; FLOAT_GROUP_LEN] {
        let bits = value.to_bits();
        let hi = encode_word((bits >> 16) as u16);
        let lo = encode_word(bits as u16);
        [hi[0], hi[1], hi[2], lo[0], lo[1], lo[2]]
    }

    fn block_fixture(values: [f32; FLOAT_COUNT]) -> [u8; MEASUREMENT_LEN] {
        let mut raw = [0u8; MEASUREMENT_LEN];
        for (chunk, value) in raw.chunks_exact_mut(FLOAT_GROUP_LEN).zip(values) {
            chunk.copy_from_slice(&encode_float(value));
        }
        raw
    }

    const FIXTURE_VALUES: [f32; FLOAT_COUNT] =
        [3.25, 7.5, 9.125, 10.0, 20.5, 24.0, 25.25, 25.5, 25.75, 0.5];

    fn ready_word() -> [u8; 3] {
        encode_word(0x0001)
    }

    #[test]
    fn test_frame_layout() {
        assert_eq!(Frame::command(Command::Sleep).as_bytes(), &[0x10, 0x01]);
        assert_eq!(
            Frame::with_argument(Command::StartMeasurement, OUTPUT_FORMAT_FLOAT).as_bytes(),
            &[0x00, 0x10, 0x03, 0x00, 0xAC]
        );
    }

    #[test]
    fn test_decode_known_bit_patterns() {
        // 0x40500000 = 3.25, 0x40F00000 = 7.5, 0x41120000 = 9.125
        let mut raw = [0u8; MEASUREMENT_LEN];
        let words: [u16; 6] = [0x4050, 0x0000, 0x40F0, 0x0000, 0x4112, 0x0000];
        for (i, word) in words.iter().enumerate() {
            raw[i * 3..i * 3 + 3].copy_from_slice(&encode_word(*word));
        }

        let pm = MeasurementBlock::decode(&raw).pm_readings();

        assert_eq!(pm.pm1, 3.25);
        assert_eq!(pm.pm2_5, 7.5);
        assert_eq!(pm.pm10, 9.125);
    }

    #[test]
    fn test_full_block_exposes_all_floats() {
        let block = MeasurementBlock::decode(&block_fixture(FIXTURE_VALUES));
        for (i, expected) in FIXTURE_VALUES.iter().enumerate() {
            assert_eq!(block.value(i), Some(*expected));
        }
        assert_eq!(block.value(FLOAT_COUNT), None);
    }

    #[test]
    fn test_crc_failure_is_per_float() {
        let mut raw = block_fixture(FIXTURE_VALUES);
        raw[2] ^= 0xFF; // CRC of PM1.0 high word

        let pm = MeasurementBlock::decode(&raw).pm_readings();

        assert_eq!(pm.pm1, PM_INVALID);
        assert_eq!(pm.pm2_5, 7.5);
        assert_eq!(pm.pm10, 9.125);
    }

    #[test]
    fn test_low_word_crc_failure_invalidates_float() {
        let mut raw = block_fixture(FIXTURE_VALUES);
        raw[6 + 4] ^= 0x01; // data byte of PM2.5 low word

        let pm = MeasurementBlock::decode(&raw).pm_readings();

        assert_eq!(pm.pm1, 3.25);
        assert_eq!(pm.pm2_5, PM_INVALID);
        assert_eq!(pm.pm10, 9.125);
    }

    #[test]
    fn test_read_two_phase_protocol() {
        let mut i2c = FakeI2c::new();
        i2c.push_read(&ready_word());
        i2c.push_read(&block_fixture(FIXTURE_VALUES));
        let mut sps = Sps30::new(i2c, RecordingDelay::default());

        let pm = block_on(sps.read()).unwrap();

        assert_eq!(
            pm,
            PmReadings {
                pm1: 3.25,
                pm2_5: 7.5,
                pm10: 9.125
            }
        );
        let writes = sps.i2c.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], (SPS30_ADDRESS, alloc::vec![0x02, 0x02]));
        assert_eq!(writes[1], (SPS30_ADDRESS, alloc::vec![0x03, 0x00]));
    }

    #[test]
    fn test_not_ready_skips_measurement_registers() {
        let mut i2c = FakeI2c::new();
        i2c.push_read(&encode_word(0x0000));
        let mut sps = Sps30::new(i2c, RecordingDelay::default());

        let result = block_on(sps.read());

        assert_eq!(result, Err(SensorError::NotReady { sensor: "SPS30" }));
        assert_eq!(sps.i2c.writes().len(), 1);
    }

    #[test]
    fn test_ready_flag_crc_mismatch_fails() {
        let mut i2c = FakeI2c::new();
        let mut word = ready_word();
        word[2] ^= 0x10;
        i2c.push_read(&word);
        let mut sps = Sps30::new(i2c, RecordingDelay::default());

        let result = block_on(sps.read());

        assert!(matches!(result, Err(SensorError::Checksum { .. })));
        assert_eq!(sps.i2c.writes().len(), 1);
    }

    #[test]
    fn test_bus_error_aborts_read() {
        let mut i2c = FakeI2c::new();
        i2c.push_read(&ready_word());
        i2c.push_read_error(ErrorKind::Other);
        let mut sps = Sps30::new(i2c, RecordingDelay::default());

        let result = block_on(sps.read());

        assert!(matches!(result, Err(SensorError::Bus { .. })));
    }

    #[test]
    fn test_short_block_aborts_read() {
        let mut i2c = FakeI2c::new();
        i2c.push_read(&ready_word());
        i2c.push_read(&block_fixture(FIXTURE_VALUES)[..40]);
        let mut sps = Sps30::new(i2c, RecordingDelay::default());

        assert!(matches!(block_on(sps.read()), Err(SensorError::Bus { .. })));
    }

    #[test]
    fn test_init_succeeds_when_wake_never_acknowledged() {
        let mut i2c = FakeI2c::new();
        for _ in 0..WAKE_ATTEMPTS {
            i2c.push_write_result(Err(ErrorKind::Other));
        }
        let mut sps = Sps30::new(i2c, RecordingDelay::default());

        assert_eq!(block_on(sps.init()), Ok(()));
        assert_eq!(sps.state(), Sps30State::Idle);
        assert_eq!(sps.i2c.writes().len(), WAKE_ATTEMPTS);
    }

    #[test]
    fn test_init_stops_retrying_after_ack() {
        let mut i2c = FakeI2c::new();
        i2c.push_write_result(Err(ErrorKind::Other));
        let mut sps = Sps30::new(i2c, RecordingDelay::default());

        block_on(sps.init()).unwrap();

        assert_eq!(sps.i2c.writes().len(), 2);
        assert_eq!(sps.state(), Sps30State::Idle);
    }

    #[test]
    fn test_start_failure_reported() {
        let mut i2c = FakeI2c::new();
        i2c.push_write_result(Err(ErrorKind::Other));
        let mut sps = Sps30::new(i2c, RecordingDelay::default());

        assert!(block_on(sps.start()).is_err());
        assert_eq!(sps.state(), Sps30State::Uninitialized);
    }

    #[test]
    fn test_state_transitions() {
        let mut sps = Sps30::new(FakeI2c::new(), RecordingDelay::default());

        block_on(sps.init()).unwrap();
        assert_eq!(sps.state(), Sps30State::Idle);
        block_on(sps.start()).unwrap();
        assert_eq!(sps.state(), Sps30State::Measuring);
        block_on(sps.stop()).unwrap();
        assert_eq!(sps.state(), Sps30State::Idle);
        block_on(sps.sleep()).unwrap();
        assert_eq!(sps.state(), Sps30State::Sleeping);
        block_on(sps.wake_up()).unwrap();
        assert_eq!(sps.state(), Sps30State::Idle);
    }
}
