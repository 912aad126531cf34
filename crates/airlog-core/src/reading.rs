//! One averaged measurement snapshot.

use core::fmt;

/// Averages over one sampling window.
///
/// PM fields are not clamped: a float that failed its CRC check is averaged
/// in as `-1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// °C
    pub temperature: f32,
    /// %RH
    pub humidity: f32,
    /// hPa
    pub pressure: f32,
    /// µg/m³
    pub pm1: f32,
    pub pm2_5: f32,
    pub pm10: f32,
    /// ppm
    pub co2: f32,
    /// Gas index, 1..=500
    pub voc: i32,
}

impl Reading {
    /// The `key=value` body of a DATA row in the combined log.
    pub fn data_fields(&self) -> DataFields<'_> {
        DataFields(self)
    }
}

pub struct DataFields<'a>(&'a Reading);

impl fmt::Display for DataFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        write!(
            f,
            "temp={:.2} hum={:.2} press={:.2} co2={:.0} voc={} pm1={:.2} pm2.5={:.2} pm10={:.2}",
            r.temperature, r.humidity, r.pressure, r.co2, r.voc, r.pm1, r.pm2_5, r.pm10
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_data_fields_format() {
        let reading = Reading {
            temperature: 23.456,
            humidity: 41.0,
            pressure: 1013.25,
            pm1: 3.25,
            pm2_5: -1.0,
            pm10: 9.5,
            co2: 612.4,
            voc: 104,
        };

        assert_eq!(
            format!("{}", reading.data_fields()),
            "temp=23.46 hum=41.00 press=1013.25 co2=612 voc=104 pm1=3.25 pm2.5=-1.00 pm10=9.50"
        );
    }
}
