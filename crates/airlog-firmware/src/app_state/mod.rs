//! Firmware run state and bring-up errors.

mod hardware;

pub use hardware::*;

use log::info;
use thiserror_no_std::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    Uninitialized,
    WifiConnecting,
    TimeSyncing,
    Waiting,
    Measuring,
    Offline,
}

impl AppRunState {
    /// Move to `next`, logging only actual changes.
    pub fn enter(&mut self, next: AppRunState) {
        if *self != next {
            info!("[APP] {:?} -> {:?}", self, next);
            *self = next;
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("I2C bus setup failed")]
    I2cBus,
    #[error("SPI bus setup failed")]
    SpiBus,
    #[error("Radio initialization failed")]
    Radio,
    #[error("Wi-Fi setup failed")]
    Wifi,
}
