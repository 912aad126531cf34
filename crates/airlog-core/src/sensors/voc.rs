//! Raw SGP40 signal to VOC index.

use gas_index_algorithm::{AlgorithmType, GasIndexAlgorithm};

/// Opaque transform from a raw gas signal (SRAW ticks) to an index.
pub trait VocAlgorithm {
    fn process(&mut self, sraw: u16) -> i32;
}

/// Sensirion's gas index algorithm in VOC mode.
pub struct GasIndexVoc {
    algorithm: GasIndexAlgorithm,
}

impl GasIndexVoc {
    /// `sampling_interval_sec` must match how often `process` is called; the
    /// algorithm's adaptive baseline is tuned against it.
    pub fn new(sampling_interval_sec: f32) -> Self {
        Self {
            algorithm: GasIndexAlgorithm::new(AlgorithmType::Voc, sampling_interval_sec),
        }
    }
}

impl VocAlgorithm for GasIndexVoc {
    fn process(&mut self, sraw: u16) -> i32 {
        self.algorithm.process(i32::from(sraw))
    }
}
