//! Per-layer EWMA timing store (C2).
//!
//! Grounded the way `onyx-core::MarketStateManager` stores per-symbol
//! state: a flat `Vec<f64>` pre-allocated to the model's layer count and
//! indexed directly by layer index, no hashing, no `Option` wrapper. The
//! hot path here is "update one float, read all of them back" rather than
//! market-data's "look up one slot a million times a second", so a single
//! `RwLock` around the vectors is the right trade — edge timings have
//! exactly one writer (the suffix executor), so that single-writer
//! discipline falls out of the lock directly.

use split_core::LayerIndex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

pub const DEFAULT_EWMA_ALPHA: f64 = 0.2;

#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("layer index {0} is out of range for a {1}-layer model")]
    LayerOutOfRange(u32, usize),

    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{path}'")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse timing file '{path}'")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("timing file '{path}' is missing entry for layer {layer}")]
    MissingLayer { path: String, layer: usize },
}

/// Coherent, point-in-time copy of the timing store, handed to the
/// offloading optimiser (C4).
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub device: Vec<f64>,
    pub edge: Vec<f64>,
    pub sizes: Vec<u32>,
}

struct Inner {
    device: Vec<f64>,
    edge: Vec<f64>,
    sizes: Vec<u32>,
}

/// Owns `T_device[0..N-1]`, `T_edge[0..N-1]`, and `S[0..N-1]` for one
/// model. One instance per model, held by the `Coordinator` behind an
/// `Arc` and shared across request handlers.
pub struct TimingStore {
    alpha: f64,
    state: RwLock<Inner>,
}

impl TimingStore {
    /// Seeds the store from initial per-layer measurements taken during
    /// edge initialisation. All three vectors must have the same length
    /// and every timing value must be strictly positive.
    pub fn new(initial_device: Vec<f64>, initial_edge: Vec<f64>, sizes: Vec<u32>) -> Self {
        debug_assert_eq!(initial_device.len(), initial_edge.len());
        debug_assert_eq!(initial_device.len(), sizes.len());
        Self {
            alpha: DEFAULT_EWMA_ALPHA,
            state: RwLock::new(Inner { device: initial_device, edge: initial_edge, sizes }),
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn num_layers(&self) -> usize {
        self.state.read().unwrap().device.len()
    }

    /// Applies the EWMA update `T[i] <- alpha*x + (1-alpha)*T[i]` to the
    /// device-side vector. The new value is computed before the write lock
    /// is taken so a cancelled caller never observes or leaves behind a
    /// torn value.
    pub fn update_device(&self, layer: LayerIndex, raw: f64) -> Result<(), TimingError> {
        self.update(layer, raw, true)
    }

    pub fn update_edge(&self, layer: LayerIndex, raw: f64) -> Result<(), TimingError> {
        self.update(layer, raw, false)
    }

    fn update(&self, layer: LayerIndex, raw: f64, device_side: bool) -> Result<(), TimingError> {
        let mut guard = self.state.write().unwrap();
        let len = guard.device.len();
        let idx = layer.as_usize();
        if idx >= len {
            return Err(TimingError::LayerOutOfRange(layer.0, len));
        }
        let vec = if device_side { &mut guard.device } else { &mut guard.edge };
        let updated = self.alpha * raw + (1.0 - self.alpha) * vec[idx];
        vec[idx] = updated;
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        let guard = self.state.read().unwrap();
        Snapshot {
            device: guard.device.clone(),
            edge: guard.edge.clone(),
            sizes: guard.sizes.clone(),
        }
    }

    /// Writes three JSON files, one mapping from `layer_<i>` to a
    /// non-negative float per vector.
    pub fn persist(
        &self,
        device_path: impl AsRef<Path>,
        edge_path: impl AsRef<Path>,
        sizes_path: impl AsRef<Path>,
    ) -> Result<(), TimingError> {
        let snapshot = self.snapshot();
        write_layer_map(device_path, &snapshot.device)?;
        write_layer_map(edge_path, &snapshot.edge)?;
        write_layer_map(sizes_path, &snapshot.sizes.iter().map(|&b| b as f64).collect::<Vec<_>>())?;
        Ok(())
    }

    /// Loads a timing store back from the three JSON files, for warm
    /// restart. Layers must be numbered `layer_0..layer_{N-1}` with no
    /// gaps; `num_layers` pins the expected count so a truncated file is
    /// rejected rather than silently producing a shorter model.
    pub fn load(
        device_path: impl AsRef<Path>,
        edge_path: impl AsRef<Path>,
        sizes_path: impl AsRef<Path>,
        num_layers: usize,
    ) -> Result<Self, TimingError> {
        let device = read_layer_map(device_path, num_layers)?;
        let edge = read_layer_map(edge_path, num_layers)?;
        let sizes = read_layer_map(sizes_path, num_layers)?
            .into_iter()
            .map(|v| v as u32)
            .collect();
        Ok(Self::new(device, edge, sizes))
    }
}

fn write_layer_map(path: impl AsRef<Path>, values: &[f64]) -> Result<(), TimingError> {
    let path_str = path.as_ref().to_string_lossy().to_string();
    let map: BTreeMap<String, f64> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (format!("layer_{i}"), v))
        .collect();
    let json = serde_json::to_string_pretty(&map).expect("BTreeMap<String, f64> always serialises");
    std::fs::write(path, json).map_err(|source| TimingError::Write { path: path_str, source })
}

fn read_layer_map(path: impl AsRef<Path>, num_layers: usize) -> Result<Vec<f64>, TimingError> {
    let path_str = path.as_ref().to_string_lossy().to_string();
    let raw = std::fs::read_to_string(&path).map_err(|source| TimingError::Read {
        path: path_str.clone(),
        source,
    })?;
    let map: BTreeMap<String, f64> =
        serde_json::from_str(&raw).map_err(|source| TimingError::Parse { path: path_str.clone(), source })?;
    let mut values = Vec::with_capacity(num_layers);
    for i in 0..num_layers {
        let key = format!("layer_{i}");
        let v = map
            .get(&key)
            .ok_or_else(|| TimingError::MissingLayer { path: path_str.clone(), layer: i })?;
        values.push(*v);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ewma_update_moves_toward_raw_by_alpha_fraction() {
        let store = TimingStore::new(vec![0.010, 1.0], vec![0.001, 1.0], vec![100, 100]);
        let before = store.snapshot().device[0];
        store.update_device(LayerIndex(0), 0.020).unwrap();
        let after = store.snapshot().device[0];
        let expected = 0.2 * 0.020 + 0.8 * before;
        assert!((after - expected).abs() < 1e-12);
    }

    #[test]
    fn ten_updates_converge_per_worked_example() {
        // Scenario S3: start at 0.010s, feed 10 reports of 0.020s.
        let store = TimingStore::new(vec![0.010], vec![0.001], vec![100]);
        for _ in 0..10 {
            store.update_device(LayerIndex(0), 0.020).unwrap();
        }
        let got = store.snapshot().device[0];
        let expected = 0.010 * 0.8f64.powi(10) + 0.020 * (1.0 - 0.8f64.powi(10));
        assert!((got - expected).abs() < 1e-9, "got {got}, expected {expected}");
    }

    #[test]
    fn update_out_of_range_layer_is_rejected() {
        let store = TimingStore::new(vec![0.01], vec![0.01], vec![10]);
        assert!(store.update_device(LayerIndex(5), 0.02).is_err());
    }

    #[test]
    fn disjoint_layer_updates_commute() {
        let a = TimingStore::new(vec![1.0, 1.0], vec![1.0, 1.0], vec![1, 1]);
        a.update_device(LayerIndex(0), 2.0).unwrap();
        a.update_device(LayerIndex(1), 3.0).unwrap();

        let b = TimingStore::new(vec![1.0, 1.0], vec![1.0, 1.0], vec![1, 1]);
        b.update_device(LayerIndex(1), 3.0).unwrap();
        b.update_device(LayerIndex(0), 2.0).unwrap();

        assert_eq!(a.snapshot().device, b.snapshot().device);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("split_timing_test_{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let (dp, ep, sp) = (dir.join("device.json"), dir.join("edge.json"), dir.join("sizes.json"));

        let store = TimingStore::new(vec![0.01, 0.02, 0.03], vec![0.1, 0.2, 0.3], vec![10, 20, 30]);
        store.persist(&dp, &ep, &sp).unwrap();

        let loaded = TimingStore::load(&dp, &ep, &sp, 3).unwrap();
        assert_eq!(store.snapshot().device, loaded.snapshot().device);
        assert_eq!(store.snapshot().edge, loaded.snapshot().edge);
        assert_eq!(store.snapshot().sizes, loaded.snapshot().sizes);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
