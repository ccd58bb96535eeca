//! Per-layer inference-time variance detection (C3).
//!
//! The statistics here follow the same manual mean/variance computation as
//! this workspace's `perf` crate (`compute_stats`), but over a bounded
//! ring of the `W` most recent *raw* measurements rather than the whole
//! run, and using the sample (N-1) variance rather than the population
//! one — coefficient-of-variation over a small window is unstable enough
//! that the reference deployment this system replaces standardised on
//! sample statistics, and this implementation preserves that convention.

use split_core::LayerIndex;
use std::collections::{HashSet, VecDeque};

pub const DEFAULT_WINDOW_SIZE: usize = 10;
pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 0.15;
const MIN_SAMPLES_FOR_VARIANCE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerStats {
    pub count: usize,
    pub mean: f64,
    pub stdev: f64,
    pub cv: f64,
    pub is_stable: bool,
}

impl LayerStats {
    fn empty() -> Self {
        Self { count: 0, mean: 0.0, stdev: 0.0, cv: 0.0, is_stable: false }
    }
}

/// Bounded history of raw measurements for one layer on one side
/// (device or edge), plus the coefficient-of-variation check over it.
struct InferenceTimeHistory {
    window_size: usize,
    threshold: f64,
    measurements: VecDeque<f64>,
}

impl InferenceTimeHistory {
    fn new(window_size: usize, threshold: f64) -> Self {
        Self { window_size, threshold, measurements: VecDeque::with_capacity(window_size) }
    }

    /// Pushes a raw measurement, evicting the oldest once the window is
    /// full, and reports whether the resulting window is unstable.
    fn add_measurement(&mut self, time: f64) -> bool {
        if self.measurements.len() == self.window_size {
            self.measurements.pop_front();
        }
        self.measurements.push_back(time);
        self.has_significant_variance()
    }

    fn stats(&self) -> LayerStats {
        let count = self.measurements.len();
        if count == 0 {
            return LayerStats::empty();
        }
        let mean = self.measurements.iter().sum::<f64>() / count as f64;
        let stdev = if count > 1 {
            let sum_sq_diff: f64 = self.measurements.iter().map(|&x| (x - mean) * (x - mean)).sum();
            (sum_sq_diff / (count - 1) as f64).sqrt()
        } else {
            0.0
        };
        let cv = if mean > 0.0 { stdev / mean } else { 0.0 };
        LayerStats { count, mean, stdev, cv, is_stable: cv <= self.threshold }
    }

    fn has_significant_variance(&self) -> bool {
        if self.measurements.len() < MIN_SAMPLES_FOR_VARIANCE {
            return false;
        }
        self.stats().cv > self.threshold
    }
}

/// Tracks variance on one side (device or edge) across all layers of one
/// model, and the set of layers currently flagged for offloading
/// re-evaluation.
struct SideTracker {
    window_size: usize,
    threshold: f64,
    histories: Vec<Option<InferenceTimeHistory>>,
    variance_layers: HashSet<u32>,
    needs_retest: bool,
}

impl SideTracker {
    fn new(num_layers: usize, window_size: usize, threshold: f64) -> Self {
        Self {
            window_size,
            threshold,
            histories: (0..num_layers).map(|_| None).collect(),
            variance_layers: HashSet::new(),
            needs_retest: false,
        }
    }

    fn add_measurement(&mut self, layer: LayerIndex, time: f64) -> bool {
        let idx = layer.as_usize();
        let history = self.histories[idx]
            .get_or_insert_with(|| InferenceTimeHistory::new(self.window_size, self.threshold));
        let unstable = history.add_measurement(time);
        if unstable {
            self.variance_layers.insert(layer.0);
            self.needs_retest = true;
        }
        unstable
    }

    fn stats(&self, layer: LayerIndex) -> LayerStats {
        self.histories[layer.as_usize()].as_ref().map(|h| h.stats()).unwrap_or_else(LayerStats::empty)
    }

    fn is_stable(&self, layer: LayerIndex) -> bool {
        self.histories[layer.as_usize()].as_ref().map(|h| h.stats().is_stable).unwrap_or(false)
    }

    /// Directly flagged layers plus their one-step successors (a flagged
    /// layer cascades suspicion onto the layer right after it), sorted
    /// ascending.
    fn layers_needing_retest(&self) -> Vec<u32> {
        let mut set: HashSet<u32> = self.variance_layers.clone();
        for &layer in &self.variance_layers {
            set.insert(layer + 1);
        }
        let mut out: Vec<u32> = set.into_iter().collect();
        out.sort_unstable();
        out
    }
}

/// The full C3 component: per-layer, per-side variance tracking for one
/// model, with the cascade and edge-triggered readout rules the
/// offloading request handler depends on.
pub struct VarianceDetector {
    device: SideTracker,
    edge: SideTracker,
}

impl VarianceDetector {
    pub fn new(num_layers: usize) -> Self {
        Self::with_params(num_layers, DEFAULT_WINDOW_SIZE, DEFAULT_VARIANCE_THRESHOLD)
    }

    pub fn with_params(num_layers: usize, window_size: usize, threshold: f64) -> Self {
        Self {
            device: SideTracker::new(num_layers, window_size, threshold),
            edge: SideTracker::new(num_layers, window_size, threshold),
        }
    }

    /// Records a raw device-side measurement. Returns true if this single
    /// measurement pushed the layer's window over the variance threshold.
    pub fn add_device_measurement(&mut self, layer: LayerIndex, time: f64) -> bool {
        self.device.add_measurement(layer, time)
    }

    pub fn add_edge_measurement(&mut self, layer: LayerIndex, time: f64) -> bool {
        self.edge.add_measurement(layer, time)
    }

    pub fn device_stats(&self, layer: LayerIndex) -> LayerStats {
        self.device.stats(layer)
    }

    pub fn edge_stats(&self, layer: LayerIndex) -> LayerStats {
        self.edge.stats(layer)
    }

    pub fn layer_stability(&self, layer: LayerIndex) -> (bool, bool) {
        (self.device.is_stable(layer), self.edge.is_stable(layer))
    }

    pub fn layers_needing_retest(&self) -> RetestSet {
        RetestSet { device: self.device.layers_needing_retest(), edge: self.edge.layers_needing_retest() }
    }

    /// Edge-triggered: true iff either side was newly flagged since the
    /// previous call. Clears both flags on read.
    pub fn should_retest_offloading(&mut self) -> bool {
        let needs_retest = self.device.needs_retest || self.edge.needs_retest;
        self.device.needs_retest = false;
        self.edge.needs_retest = false;
        needs_retest
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetestSet {
    pub device: Vec<u32>,
    pub edge: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_three_samples_is_always_stable() {
        let mut d = VarianceDetector::new(4);
        assert!(!d.add_device_measurement(LayerIndex(0), 0.01));
        assert!(!d.add_device_measurement(LayerIndex(0), 0.02));
        assert!(!d.should_retest_offloading());
    }

    #[test]
    fn stable_measurements_never_flag() {
        let mut d = VarianceDetector::new(4);
        for _ in 0..10 {
            d.add_device_measurement(LayerIndex(0), 0.010);
        }
        let stats = d.device_stats(LayerIndex(0));
        assert_eq!(stats.count, 10);
        assert!(stats.cv < 1e-9);
        assert!(stats.is_stable);
        assert!(!d.should_retest_offloading());
    }

    #[test]
    fn noisy_measurements_flag_layer_and_cascade_to_successor() {
        let mut d = VarianceDetector::new(4);
        let samples = [0.010, 0.040, 0.005, 0.050, 0.003];
        let mut flagged = false;
        for s in samples {
            if d.add_device_measurement(LayerIndex(1), s) {
                flagged = true;
            }
        }
        assert!(flagged);
        let retest = d.layers_needing_retest();
        assert!(retest.device.contains(&1));
        assert!(retest.device.contains(&2), "cascade must flag the successor layer");
        assert!(!retest.edge.contains(&1));
    }

    #[test]
    fn should_retest_offloading_clears_flag_on_read() {
        let mut d = VarianceDetector::new(4);
        for s in [0.010, 0.040, 0.005, 0.050] {
            d.add_device_measurement(LayerIndex(0), s);
        }
        assert!(d.should_retest_offloading());
        assert!(!d.should_retest_offloading(), "flag must be cleared after the first read");
    }

    #[test]
    fn window_evicts_oldest_measurement_once_full() {
        let mut d = VarianceDetector::with_params(1, 3, 0.15);
        d.add_device_measurement(LayerIndex(0), 0.010);
        d.add_device_measurement(LayerIndex(0), 0.010);
        d.add_device_measurement(LayerIndex(0), 0.010);
        assert_eq!(d.device_stats(LayerIndex(0)).count, 3);
        d.add_device_measurement(LayerIndex(0), 0.010);
        assert_eq!(d.device_stats(LayerIndex(0)).count, 3, "window must stay bounded at window_size");
    }

    #[test]
    fn device_and_edge_histories_are_independent() {
        let mut d = VarianceDetector::new(2);
        for s in [0.010, 0.040, 0.005, 0.050] {
            d.add_device_measurement(LayerIndex(0), s);
        }
        for _ in 0..4 {
            d.add_edge_measurement(LayerIndex(0), 0.020);
        }
        let retest = d.layers_needing_retest();
        assert!(!retest.edge.contains(&0));
        assert!(retest.device.contains(&0));
    }
}
