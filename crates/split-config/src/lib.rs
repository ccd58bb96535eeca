//! Typed startup configuration for the edge process.
//!
//! Mirrors the shape of `ObsidianConfig`/`OnyxConfig` in this codebase's
//! other deployables: one `#[derive(Deserialize)]` struct per concern, a
//! `defaults` module supplying `#[serde(default = "...")]` values, and a
//! dedicated `ConfigError` via `thiserror`. Loaded once at process startup
//! and never mutated afterwards — configuration errors are fatal at
//! startup, never at request time.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("local_inference_mode.probability must be in [0, 1], got {0}")]
    InvalidProbability(f64),

    #[error("model '{0}' has no configuration entry under [model.{0}]")]
    MissingModelEntry(String),

    #[error("communication.mode '{0}' is not implemented by this edge binding (only 'http' is wired up)")]
    UnsupportedCommunicationMode(String),

    #[error("variance.window_size must be >= 3, got {0}")]
    WindowTooSmall(usize),
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationMode {
    Http,
    Websocket,
    Mqtt,
}

impl CommunicationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CommunicationMode::Http => "http",
            CommunicationMode::Websocket => "websocket",
            CommunicationMode::Mqtt => "mqtt",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommunicationConfig {
    #[serde(default = "defaults::communication_mode")]
    pub mode: CommunicationMode,
}

/// One artificial-delay distribution, as configured under
/// `delay_simulation.computation` / `.network`. Untagged-by-value fields
/// are selected by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DelayKind {
    Static { value: f64 },
    Gaussian { mean: f64, std_dev: f64 },
    Uniform { min: f64, max: f64 },
    Exponential { mean: f64 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: Option<DelayKind>,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self { enabled: false, kind: None }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DelaySimulationConfig {
    #[serde(default)]
    pub computation: DelayConfig,
    #[serde(default)]
    pub network: DelayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalInferenceModeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "defaults::probability")]
    pub probability: f64,
}

impl Default for LocalInferenceModeConfig {
    fn default() -> Self {
        Self { enabled: false, probability: defaults::probability() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntryConfig {
    pub input_height: u32,
    pub input_width: u32,
    pub last_offloading_layer: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VarianceConfig {
    #[serde(default = "defaults::window_size")]
    pub window_size: usize,
    #[serde(default = "defaults::variance_threshold")]
    pub threshold: f64,
}

impl Default for VarianceConfig {
    fn default() -> Self {
        Self { window_size: defaults::window_size(), threshold: defaults::variance_threshold() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EwmaConfig {
    #[serde(default = "defaults::ewma_alpha")]
    pub alpha: f64,
}

impl Default for EwmaConfig {
    fn default() -> Self {
        Self { alpha: defaults::ewma_alpha() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "defaults::host")]
    pub host: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    #[serde(default = "defaults::request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            request_timeout_seconds: defaults::request_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NtpConfig {
    #[serde(default = "defaults::ntp_server")]
    pub server: String,
    #[serde(default = "defaults::resync_interval_seconds")]
    pub resync_interval_seconds: u64,
}

impl Default for NtpConfig {
    fn default() -> Self {
        Self {
            server: defaults::ntp_server(),
            resync_interval_seconds: defaults::resync_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "defaults::max_concurrent_suffix_runs")]
    pub max_concurrent_suffix_runs: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { max_concurrent_suffix_runs: defaults::max_concurrent_suffix_runs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    #[serde(default)]
    pub communication: CommunicationConfig,
    #[serde(default)]
    pub delay_simulation: DelaySimulationConfig,
    #[serde(default)]
    pub local_inference_mode: LocalInferenceModeConfig,
    #[serde(default)]
    pub model: HashMap<String, ModelEntryConfig>,
    #[serde(default = "defaults::default_model")]
    pub default_model: String,
    #[serde(default)]
    pub variance: VarianceConfig,
    #[serde(default)]
    pub ewma: EwmaConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ntp: NtpConfig,
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self { mode: defaults::communication_mode() }
    }
}

mod defaults {
    use super::CommunicationMode;

    pub fn communication_mode() -> CommunicationMode {
        CommunicationMode::Http
    }

    pub fn probability() -> f64 {
        0.0
    }

    pub fn window_size() -> usize {
        10
    }

    pub fn variance_threshold() -> f64 {
        0.15
    }

    pub fn ewma_alpha() -> f64 {
        0.2
    }

    pub fn host() -> String {
        "0.0.0.0".into()
    }

    pub fn port() -> u16 {
        8080
    }

    pub fn request_timeout_seconds() -> u64 {
        5
    }

    pub fn ntp_server() -> String {
        "pool.ntp.org".into()
    }

    pub fn resync_interval_seconds() -> u64 {
        600
    }

    pub fn max_concurrent_suffix_runs() -> usize {
        4
    }

    pub fn default_model() -> String {
        "default".into()
    }
}

impl EdgeConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: EdgeConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every invariant that must hold before the edge process starts
    /// accepting requests. Called once by `EdgeConfig::load`, and again by
    /// tests that build a config in memory instead of from a file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.local_inference_mode.probability) {
            return Err(ConfigError::InvalidProbability(self.local_inference_mode.probability));
        }
        if self.variance.window_size < 3 {
            return Err(ConfigError::WindowTooSmall(self.variance.window_size));
        }
        if !self.model.contains_key(&self.default_model) {
            return Err(ConfigError::MissingModelEntry(self.default_model.clone()));
        }
        Ok(())
    }

    /// Startup-fatal check that the configured transport binding is one
    /// this process actually implements. A config file shared across
    /// deployables may legitimately name `websocket` or `mqtt`; only an
    /// edge process asked to bind one of those should fail.
    pub fn require_supported_mode(&self) -> Result<(), ConfigError> {
        match self.communication.mode {
            CommunicationMode::Http => Ok(()),
            other => Err(ConfigError::UnsupportedCommunicationMode(other.as_str().into())),
        }
    }

    pub fn default_model_entry(&self) -> &ModelEntryConfig {
        self.model
            .get(&self.default_model)
            .expect("validate() guarantees the default model entry exists")
    }
}
