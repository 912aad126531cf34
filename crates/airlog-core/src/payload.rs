//! JSON payload for live delivery and the retry queue.
//!
//! Both paths must produce byte-identical documents, so everything that
//! serializes a reading for the wire goes through [`encode`].

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;
use time::UtcOffset;

use crate::reading::Reading;
use crate::timefmt;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Failed to encode payload as JSON")]
    Encode,
    #[error("Failed to decode JSON payload")]
    Decode,
}

/// One record in the `data` array.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Record {
    pub time: String,
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub pm1: f32,
    pub pm2_5: f32,
    pub pm10: f32,
    pub co2: f32,
    pub voc: i32,
}

impl Record {
    pub fn new(time: &str, reading: &Reading) -> Self {
        Self {
            time: String::from(time),
            temperature: reading.temperature,
            humidity: reading.humidity,
            pressure: reading.pressure,
            pm1: reading.pm1,
            pm2_5: reading.pm2_5,
            pm10: reading.pm10,
            co2: reading.co2,
            voc: reading.voc,
        }
    }

    pub fn reading(&self) -> Reading {
        Reading {
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            pm1: self.pm1,
            pm2_5: self.pm2_5,
            pm10: self.pm10,
            co2: self.co2,
            voc: self.voc,
        }
    }
}

/// `{"device": "device<ID>", "data": [ {...} ]}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Payload {
    pub device: String,
    pub data: Vec<Record>,
}

impl Payload {
    pub fn single(device_id: &str, time: &str, reading: &Reading) -> Self {
        Self {
            device: device_label(device_id),
            data: vec![Record::new(time, reading)],
        }
    }

    pub fn to_json(&self) -> Result<String, PayloadError> {
        serde_json::to_string(self).map_err(|_| PayloadError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        serde_json::from_str(json).map_err(|_| PayloadError::Decode)
    }
}

pub fn device_label(device_id: &str) -> String {
    format!("device{}", device_id)
}

/// Serialize one reading taken at `unix` seconds, timestamped in local time.
pub fn encode(
    device_id: &str,
    unix: i64,
    offset: UtcOffset,
    reading: &Reading,
) -> Result<String, PayloadError> {
    let time = timefmt::format_local(unix, offset);
    Payload::single(device_id, time.as_str(), reading).to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timefmt::offset_from_hours;

    fn sample_reading() -> Reading {
        Reading {
            temperature: 22.5,
            humidity: 41.25,
            pressure: 1012.75,
            pm1: 3.1,
            pm2_5: 7.4,
            pm10: -1.0,
            co2: 615.0,
            voc: 104,
        }
    }

    #[test]
    fn test_encode_layout() {
        // 2024-03-01 08:30:15 UTC
        let json = encode("7", 1_709_281_815, offset_from_hours(4), &sample_reading()).unwrap();

        assert_eq!(
            json,
            "{\"device\":\"device7\",\"data\":[{\"time\":\"2024-03-01 12:30:15\",\
             \"temperature\":22.5,\"humidity\":41.25,\"pressure\":1012.75,\
             \"pm1\":3.1,\"pm2_5\":7.4,\"pm10\":-1.0,\"co2\":615.0,\"voc\":104}]}"
        );
    }

    #[test]
    fn test_decode_then_reencode_is_identical() {
        let json = encode("7", 1_709_281_815, offset_from_hours(4), &sample_reading()).unwrap();

        let decoded = Payload::from_json(&json).unwrap();

        assert_eq!(decoded.data[0].reading(), sample_reading());
        assert_eq!(decoded.to_json().unwrap(), json);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(
            Payload::from_json("{\"device\":\"device7\""),
            Err(PayloadError::Decode)
        );
    }
}
