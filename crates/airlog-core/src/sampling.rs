//! Fixed-window sample aggregation across all sensors.
//!
//! One call to [`Instruments::sample`] reads every sensor `duration / interval`
//! times, waiting `interval` seconds after each round, and averages the sums.
//! Nothing else runs on the device while the window is open.

use embedded_hal_async::delay::DelayNs;
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::config::Co2Policy;
use crate::reading::Reading;
use crate::sensors::{
    ClimateReadings, Co2Readings, Lifecycle, PmReadings, RawVocSensor, Sensor, SensorError,
    VocAlgorithm,
};

/// Compensation used for the VOC signal until the climate sensor reports.
const DEFAULT_TEMPERATURE_C: f32 = 25.0;
const DEFAULT_HUMIDITY_PERCENT: f32 = 50.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingError {
    #[error("Sampling window of {duration_sec}s holds no {interval_sec}s sub-sample")]
    EmptyWindow { duration_sec: u32, interval_sec: u32 },
}

/// Running sums for one window. Counts are per sensor since each can fail on
/// its own, but averages always divide by the target sample count.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleWindow {
    temperature: f32,
    humidity: f32,
    pressure: f32,
    pm1: f32,
    pm2_5: f32,
    pm10: f32,
    co2: f32,
    voc: i64,
    pub pm_reads: u32,
    pub climate_reads: u32,
    pub co2_reads: u32,
    pub voc_reads: u32,
}

impl SampleWindow {
    fn add_pm(&mut self, pm: PmReadings) {
        self.pm1 += pm.pm1;
        self.pm2_5 += pm.pm2_5;
        self.pm10 += pm.pm10;
        self.pm_reads += 1;
    }

    fn add_climate(&mut self, climate: ClimateReadings) {
        self.temperature += climate.temperature_celsius;
        self.humidity += climate.humidity_percent;
        self.pressure += climate.pressure_hpa;
        self.climate_reads += 1;
    }

    fn add_co2(&mut self, co2_ppm: f32) {
        self.co2 += co2_ppm;
        self.co2_reads += 1;
    }

    fn add_voc(&mut self, index: i32) {
        self.voc += i64::from(index);
        self.voc_reads += 1;
    }

    /// Divide every sum by `samples`, which must be non-zero.
    pub fn average(&self, samples: u32) -> Reading {
        let n = samples as f32;
        Reading {
            temperature: self.temperature / n,
            humidity: self.humidity / n,
            pressure: self.pressure / n,
            pm1: self.pm1 / n,
            pm2_5: self.pm2_5 / n,
            pm10: self.pm10 / n,
            co2: self.co2 / n,
            voc: (self.voc / i64::from(samples)) as i32,
        }
    }
}

/// Which sensors came up during [`Instruments::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitReport {
    pub pm: bool,
    pub climate: bool,
    pub co2: bool,
    pub voc: bool,
}

/// Every sensor the logger samples, plus the delay used to pace the window.
pub struct Instruments<P, T, C, G, V, D> {
    pub pm: P,
    pub climate: T,
    pub co2: C,
    pub gas: G,
    voc_algorithm: V,
    delay: D,
    co2_policy: Co2Policy,
    last_co2: Option<f32>,
    last_climate: Option<ClimateReadings>,
}

impl<P, T, C, G, V, D> Instruments<P, T, C, G, V, D>
where
    P: Sensor<Readings = PmReadings>,
    T: Sensor<Readings = ClimateReadings>,
    C: Sensor<Readings = Co2Readings>,
    G: RawVocSensor,
    V: VocAlgorithm,
    D: DelayNs,
{
    pub fn new(
        pm: P,
        climate: T,
        co2: C,
        gas: G,
        voc_algorithm: V,
        delay: D,
        co2_policy: Co2Policy,
    ) -> Self {
        Self {
            pm,
            climate,
            co2,
            gas,
            voc_algorithm,
            delay,
            co2_policy,
            last_co2: None,
            last_climate: None,
        }
    }

    pub fn last_co2(&self) -> Option<f32> {
        self.last_co2
    }

    /// Initialize every sensor. Failures are logged, never fatal.
    pub async fn init(&mut self) -> InitReport {
        let report = InitReport {
            pm: report_init("SPS30", self.pm.init().await),
            climate: report_init("BME280", self.climate.init().await),
            co2: report_init("SCD30", self.co2.init().await),
            voc: report_init("SGP40", self.gas.init().await),
        };
        info!("[SAMPLE] Sensor init: {:?}", report);
        report
    }

    /// Start measurements and let the SPS30 fan run for `warmup_sec`.
    pub async fn warm_up(&mut self, warmup_sec: u32) {
        if let Err(e) = self.pm.start().await {
            warn!("[SPS30] Start failed: {}", e);
        }
        if let Err(e) = self.climate.start().await {
            warn!("[SAMPLE] Climate start failed: {}", e);
        }
        if let Err(e) = self.co2.start().await {
            warn!("[SAMPLE] CO2 start failed: {}", e);
        }
        if let Err(e) = self.gas.start().await {
            warn!("[SAMPLE] VOC start failed: {}", e);
        }

        info!("[SAMPLE] Warming up for {} s", warmup_sec);
        self.delay.delay_ms(warmup_sec.saturating_mul(1000)).await;
    }

    /// Stop the SPS30 fan and put every sensor into its low-power state.
    pub async fn power_down(&mut self) {
        let results = [
            ("SPS30 stop", self.pm.stop().await),
            ("SPS30 sleep", self.pm.sleep().await),
            ("BME280 sleep", self.climate.sleep().await),
            ("SCD30 sleep", self.co2.sleep().await),
            ("SGP40 sleep", self.gas.sleep().await),
        ];
        for (step, result) in results {
            if let Err(e) = result {
                warn!("[SAMPLE] {} failed: {}", step, e);
            }
        }
    }

    /// Run one sampling window and return the averages.
    ///
    /// A failed read adds nothing to its sums but still counts toward the
    /// denominator. CO2 follows the configured [`Co2Policy`] when the sensor
    /// has nothing new.
    pub async fn sample(
        &mut self,
        duration_sec: u32,
        interval_sec: u32,
    ) -> Result<Reading, SamplingError> {
        let samples = duration_sec.checked_div(interval_sec).unwrap_or(0);
        if samples == 0 {
            return Err(SamplingError::EmptyWindow {
                duration_sec,
                interval_sec,
            });
        }

        info!("[SAMPLE] Sampling {} x {} s", samples, interval_sec);

        let mut window = SampleWindow::default();
        for round in 0..samples {
            match self.pm.read().await {
                Ok(pm) => window.add_pm(pm),
                Err(e) => debug!("[SAMPLE] PM read {} skipped: {}", round, e),
            }

            match self.climate.read().await {
                Ok(climate) => {
                    window.add_climate(climate);
                    self.last_climate = Some(climate);
                }
                Err(e) => warn!("[SAMPLE] Climate read {} skipped: {}", round, e),
            }

            match self.co2.read().await {
                Ok(co2) => {
                    window.add_co2(co2.co2_ppm);
                    self.last_co2 = Some(co2.co2_ppm);
                }
                Err(e) => {
                    debug!("[SAMPLE] CO2 read {}: {}", round, e);
                    if let (Co2Policy::HoldLast, Some(last)) = (self.co2_policy, self.last_co2) {
                        window.add_co2(last);
                    }
                }
            }

            let (temperature, humidity) = self
                .last_climate
                .map(|c| (c.temperature_celsius, c.humidity_percent))
                .unwrap_or((DEFAULT_TEMPERATURE_C, DEFAULT_HUMIDITY_PERCENT));
            match self.gas.measure_raw(humidity, temperature).await {
                Ok(sraw) => window.add_voc(self.voc_algorithm.process(sraw)),
                Err(e) => debug!("[SAMPLE] VOC read {} skipped: {}", round, e),
            }

            self.delay.delay_ms(interval_sec.saturating_mul(1000)).await;
        }

        info!(
            "[SAMPLE] Window done: pm {}/{} climate {}/{} co2 {}/{} voc {}/{}",
            window.pm_reads,
            samples,
            window.climate_reads,
            samples,
            window.co2_reads,
            samples,
            window.voc_reads,
            samples
        );

        Ok(window.average(samples))
    }
}

/// One measurement pass as the cycle sees it: spin up, sample, power down.
pub trait Acquisition {
    fn warm_up(&mut self, warmup_sec: u32) -> impl Future<Output = ()>;

    fn sample(
        &mut self,
        duration_sec: u32,
        interval_sec: u32,
    ) -> impl Future<Output = Result<Reading, SamplingError>>;

    fn power_down(&mut self) -> impl Future<Output = ()>;
}

impl<P, T, C, G, V, D> Acquisition for Instruments<P, T, C, G, V, D>
where
    P: Sensor<Readings = PmReadings>,
    T: Sensor<Readings = ClimateReadings>,
    C: Sensor<Readings = Co2Readings>,
    G: RawVocSensor,
    V: VocAlgorithm,
    D: DelayNs,
{
    async fn warm_up(&mut self, warmup_sec: u32) {
        Instruments::warm_up(self, warmup_sec).await
    }

    async fn sample(
        &mut self,
        duration_sec: u32,
        interval_sec: u32,
    ) -> Result<Reading, SamplingError> {
        Instruments::sample(self, duration_sec, interval_sec).await
    }

    async fn power_down(&mut self) {
        Instruments::power_down(self).await
    }
}

fn report_init(sensor: &str, result: Result<(), SensorError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("[SAMPLE] {} init failed: {}", sensor, e);
            false
        }
    }
}
