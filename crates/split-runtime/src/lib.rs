//! Layer runtime adapter (C1): executes one compiled layer artefact and
//! reports the wall time it took, independent of any particular numeric
//! framework.
//!
//! `CachedNativeRuntime` lazily loads and caches one artefact handle per
//! layer index behind a `Vec<OnceLock<_>>`, the same one-time-init shape
//! this workspace already uses for `OnceLock<(u64, u64)>` timebases —
//! generalised here to one slot per layer instead of one slot process-wide,
//! so concurrent first-touches on different layers never contend and
//! concurrent first-touches on the *same* layer never double-initialise.

use split_core::{LayerIndex, Model};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("layer {0} is out of range for this model")]
    LayerOutOfRange(u32),

    #[error("artefact for layer {layer} not found at '{path}'")]
    ArtefactMissing { layer: u32, path: String },

    #[error("failed to read artefact for layer {layer} at '{path}'")]
    ArtefactRead {
        layer: u32,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("artefact for layer {layer} is malformed: expected at least 8 bytes, got {len}")]
    ArtefactMalformed { layer: u32, len: usize },

    #[error("input tensor for layer {layer} has {got} elements, expected {expected}")]
    ShapeMismatch { layer: u32, expected: usize, got: usize },
}

/// Contract every layer execution backend implements. `evaluate` returns
/// the wall time actually spent computing — any artificial delay an
/// implementation injects for test purposes must not be included.
pub trait LayerRuntime {
    fn evaluate(&self, layer: LayerIndex, input: &Tensor) -> Result<(Tensor, f64), RuntimeError>;
}

/// One loaded layer artefact. Stands in for a framework-specific
/// interpreter handle (e.g. a cached TFLite interpreter in the reference
/// system this adapter replaces): a per-element affine transform read
/// once from disk and applied on every call.
struct LayerArtifact {
    scale: f32,
    bias: f32,
}

impl LayerArtifact {
    /// Artefact file layout: 4-byte LE f32 scale, 4-byte LE f32 bias.
    fn load(path: &Path) -> Result<Self, (String, std::io::Error)> {
        let bytes = std::fs::read(path).map_err(|e| (path.display().to_string(), e))?;
        if bytes.len() < 8 {
            return Err((
                path.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::InvalidData, "artefact too short"),
            ));
        }
        let scale = f32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let bias = f32::from_le_bytes(bytes[4..8].try_into().unwrap());
        Ok(Self { scale, bias })
    }

    fn apply(&self, input: &Tensor) -> Tensor {
        let data = input.data.iter().map(|&x| x * self.scale + self.bias).collect();
        Tensor::new(input.shape.clone(), data)
    }
}

/// Production C1 implementation. One artefact directory per model,
/// artefact files named `layer_<i>.bin`, loaded on first touch and kept
/// resident for the process lifetime.
pub struct CachedNativeRuntime {
    artefact_dir: PathBuf,
    num_layers: usize,
    cache: Vec<OnceLock<LayerArtifact>>,
}

impl CachedNativeRuntime {
    pub fn new(model: &Model, artefact_dir: impl Into<PathBuf>) -> Self {
        let num_layers = model.num_layers();
        Self {
            artefact_dir: artefact_dir.into(),
            num_layers,
            cache: (0..num_layers).map(|_| OnceLock::new()).collect(),
        }
    }

    fn artefact_path(&self, layer: u32) -> PathBuf {
        self.artefact_dir.join(format!("layer_{layer}.bin"))
    }

    fn load_artifact(&self, layer: u32) -> Result<&LayerArtifact, RuntimeError> {
        let idx = layer as usize;
        if idx >= self.num_layers {
            return Err(RuntimeError::LayerOutOfRange(layer));
        }
        if let Some(artifact) = self.cache[idx].get() {
            return Ok(artifact);
        }
        let path = self.artefact_path(layer);
        if !path.exists() {
            return Err(RuntimeError::ArtefactMissing { layer, path: path.display().to_string() });
        }
        let artifact = LayerArtifact::load(&path).map_err(|(path, source)| {
            if source.kind() == std::io::ErrorKind::InvalidData {
                RuntimeError::ArtefactMalformed { layer, len: 0 }
            } else {
                RuntimeError::ArtefactRead { layer, path, source }
            }
        })?;
        // `OnceLock::get_or_init` serialises concurrent first-touches on
        // this slot; whichever caller wins the race, all callers observe
        // the same artefact.
        Ok(self.cache[idx].get_or_init(|| artifact))
    }
}

impl LayerRuntime for CachedNativeRuntime {
    fn evaluate(&self, layer: LayerIndex, input: &Tensor) -> Result<(Tensor, f64), RuntimeError> {
        let artifact = self.load_artifact(layer.0)?;
        let start = Instant::now();
        let output = artifact.apply(input);
        let elapsed = start.elapsed().as_secs_f64();
        tracing::debug!(layer = layer.0, elapsed_s = elapsed, "layer evaluated");
        Ok((output, elapsed))
    }
}

/// Deterministic test double. Applies `y = x` (or a caller-supplied
/// transform) and can inject a fixed artificial delay that is excluded
/// from the reported wall time, per the C1 contract.
pub struct MockRuntime {
    num_layers: usize,
    artificial_delay: Option<std::time::Duration>,
    transform: Box<dyn Fn(LayerIndex, &Tensor) -> Tensor + Send + Sync>,
}

impl MockRuntime {
    pub fn identity(num_layers: usize) -> Self {
        Self { num_layers, artificial_delay: None, transform: Box::new(|_, t| t.clone()) }
    }

    pub fn with_artificial_delay(mut self, delay: std::time::Duration) -> Self {
        self.artificial_delay = Some(delay);
        self
    }

    pub fn with_transform(
        mut self,
        transform: impl Fn(LayerIndex, &Tensor) -> Tensor + Send + Sync + 'static,
    ) -> Self {
        self.transform = Box::new(transform);
        self
    }
}

impl LayerRuntime for MockRuntime {
    fn evaluate(&self, layer: LayerIndex, input: &Tensor) -> Result<(Tensor, f64), RuntimeError> {
        if layer.as_usize() >= self.num_layers {
            return Err(RuntimeError::LayerOutOfRange(layer.0));
        }
        let start = Instant::now();
        let output = (self.transform)(layer, input);
        let elapsed = start.elapsed().as_secs_f64();
        if let Some(delay) = self.artificial_delay {
            std::thread::sleep(delay);
        }
        Ok((output, elapsed))
    }
}
