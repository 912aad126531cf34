//! Hardware-independent core library for airlog
//!
//! This crate contains all platform-agnostic logic for the airlog environmental
//! data logger: Sensirion I2C protocol drivers, the sample aggregator, wire
//! formats, the SD-card backed log store and retry queue, the remote log
//! mirror, the firmware update check, and the per-cycle orchestration.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod bus;
pub mod config;
pub mod crc;
pub mod mirror;
pub mod ota;
pub mod payload;
pub mod reading;
pub mod sampling;
pub mod schedule;
pub mod sensors;
pub mod station;
pub mod storage;
pub mod timefmt;
pub mod uplink;

#[cfg(test)]
pub(crate) mod testing;
