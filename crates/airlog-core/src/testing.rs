//! Host-side test doubles for the hardware and network seams.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::vec::Vec;

use embedded_hal::i2c::ErrorKind;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

use crate::sensors::{Lifecycle, RawVocSensor, Sensor, SensorError, VocAlgorithm};
use crate::storage::{Clock, Storage, StorageError};
use crate::uplink::{BodySource, Uplink, UplinkError};

/// Scripted I2C bus. Writes are recorded and acknowledged unless a failure
/// was queued; reads are served from a queue and must match the buffer length.
#[derive(Default)]
pub struct FakeI2c {
    writes: Vec<(u8, Vec<u8>)>,
    write_results: VecDeque<Result<(), ErrorKind>>,
    reads: VecDeque<Result<Vec<u8>, ErrorKind>>,
}

impl FakeI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_read(&mut self, data: &[u8]) {
        self.reads.push_back(Ok(data.to_vec()));
    }

    pub fn push_read_error(&mut self, error: ErrorKind) {
        self.reads.push_back(Err(error));
    }

    pub fn push_write_result(&mut self, result: Result<(), ErrorKind>) {
        self.write_results.push_back(result);
    }

    pub fn writes(&self) -> &[(u8, Vec<u8>)] {
        &self.writes
    }
}

impl ErrorType for FakeI2c {
    type Error = ErrorKind;
}

impl I2c for FakeI2c {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    self.writes.push((address, bytes.to_vec()));
                    self.write_results.pop_front().unwrap_or(Ok(()))?;
                }
                Operation::Read(buf) => {
                    let data = self.reads.pop_front().unwrap_or(Err(ErrorKind::Other))?;
                    if data.len() != buf.len() {
                        return Err(ErrorKind::Other);
                    }
                    buf.copy_from_slice(&data);
                }
            }
        }
        Ok(())
    }
}

/// Delay that returns immediately and adds up what was requested.
#[derive(Default)]
pub struct RecordingDelay {
    total_ns: u64,
}

impl RecordingDelay {
    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }
}

impl DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }

    async fn delay_us(&mut self, us: u32) {
        self.total_ns += u64::from(us) * 1_000;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.total_ns += u64::from(ms) * 1_000_000;
    }
}

pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

/// In-memory [`Storage`] that can be unplugged or made to fail writes.
pub struct MemStorage {
    files: BTreeMap<&'static str, Vec<u8>>,
    present: bool,
    fail_writes: bool,
    append_calls: usize,
}

impl MemStorage {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            present: true,
            fail_writes: false,
            append_calls: 0,
        }
    }

    pub fn set_present(&mut self, present: bool) {
        self.present = present;
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(name).cloned()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.present {
            Ok(())
        } else {
            Err(StorageError::Unavailable)
        }
    }

    fn check_write(&self) -> Result<(), StorageError> {
        self.check()?;
        if self.fail_writes {
            return Err(StorageError::Io { operation: "write" });
        }
        Ok(())
    }
}

impl Storage for MemStorage {
    fn probe(&mut self) -> Result<(), StorageError> {
        self.check()
    }

    fn append(&mut self, name: &'static str, data: &[u8]) -> Result<(), StorageError> {
        self.check_write()?;
        self.append_calls += 1;
        self.files.entry(name).or_default().extend_from_slice(data);
        Ok(())
    }

    fn write(&mut self, name: &'static str, data: &[u8]) -> Result<(), StorageError> {
        self.check_write()?;
        self.files.insert(name, data.to_vec());
        Ok(())
    }

    fn read_at(
        &mut self,
        name: &'static str,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        self.check()?;
        let file = self.files.get(name).ok_or(StorageError::NotFound { name })?;
        let start = (offset as usize).min(file.len());
        let n = (file.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&file[start..start + n]);
        Ok(n)
    }

    fn size(&mut self, name: &'static str) -> Result<Option<u32>, StorageError> {
        self.check()?;
        Ok(self.files.get(name).map(|f| f.len() as u32))
    }

    fn remove(&mut self, name: &'static str) -> Result<(), StorageError> {
        self.check_write()?;
        self.files.remove(name);
        Ok(())
    }
}

/// Scripted HTTP client. Unscripted requests fail with
/// [`UplinkError::Connect`], as if the network were down.
#[derive(Default)]
pub struct ScriptedUplink {
    post_results: VecDeque<Result<u16, UplinkError>>,
    put_results: VecDeque<Result<u16, UplinkError>>,
    get_results: VecDeque<Result<(u16, Vec<u8>), UplinkError>>,
    posts: Vec<(String, Vec<u8>)>,
    puts: Vec<(String, String, Vec<u8>)>,
    gets: Vec<String>,
}

impl ScriptedUplink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_post(&mut self, result: Result<u16, UplinkError>) {
        self.post_results.push_back(result);
    }

    pub fn push_put(&mut self, result: Result<u16, UplinkError>) {
        self.put_results.push_back(result);
    }

    pub fn push_get(&mut self, result: Result<(u16, Vec<u8>), UplinkError>) {
        self.get_results.push_back(result);
    }

    pub fn posts(&self) -> &[(String, Vec<u8>)] {
        &self.posts
    }

    pub fn puts(&self) -> &[(String, String, Vec<u8>)] {
        &self.puts
    }

    pub fn gets(&self) -> &[String] {
        &self.gets
    }
}

impl Uplink for ScriptedUplink {
    async fn post_json(&mut self, url: &str, body: &[u8]) -> Result<u16, UplinkError> {
        self.posts.push((String::from(url), body.to_vec()));
        self.post_results
            .pop_front()
            .unwrap_or(Err(UplinkError::Connect))
    }

    async fn put<B: BodySource>(
        &mut self,
        url: &str,
        content_type: &str,
        body: &mut B,
    ) -> Result<u16, UplinkError> {
        let mut data = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let n = body.read_chunk(&mut chunk)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
        }
        self.puts
            .push((String::from(url), String::from(content_type), data));
        self.put_results
            .pop_front()
            .unwrap_or(Err(UplinkError::Connect))
    }

    async fn get(&mut self, url: &str, buf: &mut [u8]) -> Result<(u16, usize), UplinkError> {
        self.gets.push(String::from(url));
        let (status, body) = self
            .get_results
            .pop_front()
            .unwrap_or(Err(UplinkError::Connect))?;
        if body.len() > buf.len() {
            return Err(UplinkError::ResponseTooLarge);
        }
        buf[..body.len()].copy_from_slice(&body);
        Ok((status, body.len()))
    }
}

/// Sensor double serving queued results; an empty queue reads as defaults.
pub struct ScriptedSensor<R> {
    results: VecDeque<Result<R, SensorError>>,
    reads: usize,
    started: bool,
    sleeping: bool,
}

impl<R> ScriptedSensor<R> {
    pub fn new() -> Self {
        Self {
            results: VecDeque::new(),
            reads: 0,
            started: false,
            sleeping: false,
        }
    }

    pub fn push(&mut self, result: Result<R, SensorError>) {
        self.results.push_back(result);
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn sleeping(&self) -> bool {
        self.sleeping
    }
}

impl<R> Lifecycle for ScriptedSensor<R> {
    async fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SensorError> {
        self.started = true;
        self.sleeping = false;
        Ok(())
    }

    async fn sleep(&mut self) -> Result<(), SensorError> {
        self.sleeping = true;
        Ok(())
    }
}

impl<R: Default> Sensor for ScriptedSensor<R> {
    type Readings = R;

    async fn read(&mut self) -> Result<R, SensorError> {
        self.reads += 1;
        self.results.pop_front().unwrap_or_else(|| Ok(R::default()))
    }
}

/// Raw VOC double recording the compensation it was given as
/// `(humidity, temperature)`.
#[derive(Default)]
pub struct ScriptedVoc {
    results: VecDeque<Result<u16, SensorError>>,
    measurements: Vec<(f32, f32)>,
}

impl ScriptedVoc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: Result<u16, SensorError>) {
        self.results.push_back(result);
    }

    pub fn measurements(&self) -> &[(f32, f32)] {
        &self.measurements
    }
}

impl Lifecycle for ScriptedVoc {
    async fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

impl RawVocSensor for ScriptedVoc {
    async fn measure_raw(
        &mut self,
        humidity_percent: f32,
        temperature_celsius: f32,
    ) -> Result<u16, SensorError> {
        self.measurements
            .push((humidity_percent, temperature_celsius));
        self.results.pop_front().unwrap_or(Ok(0))
    }
}

/// VOC transform that is easy to reason about: raw / 100.
pub struct StepVoc;

impl VocAlgorithm for StepVoc {
    fn process(&mut self, sraw: u16) -> i32 {
        i32::from(sraw / 100)
    }
}
