//! ESP32-S3 firmware-specific modules for airlog
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: ESP32 peripheral initialization, Wi-Fi and SNTP, the HTTP(S)
//! uplink over embassy-net, and the build-time secrets.

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod clock;
pub mod http;
pub mod secrets;
pub mod sntp;
pub mod wifi;
