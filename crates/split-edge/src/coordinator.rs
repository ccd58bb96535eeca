use crate::error::EdgeError;
use crate::refresher::Refresher;
use crate::telemetry::{ErrorCategory, Telemetry, TelemetrySnapshot};
use split_core::{ClientId, LayerIndex, Model, SplitIndex};
use split_journal::{EvaluationJournal, EvaluationRecord};
use split_optimizer::{self, NetworkCost};
use split_registry::{ClientRegistry, DefaultModelPolicy};
use split_runtime::{LayerRuntime, Tensor};
use split_timing::TimingStore;
use split_variance::VarianceDetector;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// The process-wide owner of the timing store, variance detector, client
/// registry, and evaluation journal — constructed once at startup and
/// shared via `Arc` with every request handler.
pub struct Coordinator {
    model: Model,
    timing: TimingStore,
    variance: Mutex<VarianceDetector>,
    registry: ClientRegistry,
    journal: EvaluationJournal,
    runtime: Box<dyn LayerRuntime + Send + Sync>,
    refresher: Refresher,
    telemetry: Telemetry,
    next_auto_id: AtomicU64,
    default_split: SplitIndex,
    device_timings_path: PathBuf,
    edge_timings_path: PathBuf,
    layer_sizes_path: PathBuf,
}

pub struct RegistrationOutcome {
    pub client_id: ClientId,
    pub model_name: String,
}

impl Coordinator {
    pub fn new(
        model: Model,
        timing: TimingStore,
        variance: VarianceDetector,
        default_model_name: impl Into<String>,
        journal: EvaluationJournal,
        runtime: Box<dyn LayerRuntime + Send + Sync>,
        refresh_probability: f64,
        default_last_offloading_layer: u32,
        device_timings_path: impl Into<PathBuf>,
        edge_timings_path: impl Into<PathBuf>,
        layer_sizes_path: impl Into<PathBuf>,
    ) -> Self {
        let num_layers = model.num_layers() as u32;
        let default_split = SplitIndex::from_wire(default_last_offloading_layer as i32, num_layers);
        Self {
            model,
            timing,
            variance: Mutex::new(variance),
            registry: ClientRegistry::new(DefaultModelPolicy::new(default_model_name)),
            journal,
            runtime,
            refresher: Refresher::new(refresh_probability),
            telemetry: Telemetry::new(),
            next_auto_id: AtomicU64::new(0),
            default_split,
            device_timings_path: device_timings_path.into(),
            edge_timings_path: edge_timings_path.into(),
            layer_sizes_path: layer_sizes_path.into(),
        }
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Auto-assigns an ASCII id at most `MAX_CLIENT_ID_BYTES` long: `a`
    /// followed by 8 zero-padded digits.
    fn generate_client_id(&self) -> ClientId {
        let n = self.next_auto_id.fetch_add(1, Ordering::Relaxed);
        ClientId::new(format!("a{n:08}")).expect("generated id is always 9 ASCII bytes")
    }

    pub fn register(&self, requested_client_id: Option<String>) -> Result<RegistrationOutcome, EdgeError> {
        let client_id = match requested_client_id {
            Some(raw) if !raw.is_empty() => {
                ClientId::new(raw).map_err(|e| EdgeError::Internal(Box::new(e)))?
            }
            _ => self.generate_client_id(),
        };
        let record = self.registry.register(client_id.clone());
        Ok(RegistrationOutcome { client_id, model_name: record.model_name })
    }

    /// Decodes an RGB565 diagnostic frame. Informational only; never on
    /// the inference hot path.
    pub fn handle_device_input(&self, buf: &[u8], height: u32, width: u32) -> Result<(), EdgeError> {
        match split_wire::decode_rgb565_frame(buf, height, width) {
            Ok(pixels) => {
                tracing::debug!(pixel_count = pixels.len(), "received diagnostic frame");
                Ok(())
            }
            Err(e) => {
                self.telemetry.record(ErrorCategory::Parse);
                Err(EdgeError::BadWireFormat(e))
            }
        }
    }

    /// Full C6 `device_inference_result` handling: parse, update device
    /// timings/variance, run the edge suffix, recompute the next split,
    /// append to the evaluation journal, and apply the local-inference
    /// refresher.
    ///
    /// `received_at` is the edge's own clock at the moment this payload
    /// arrived, used to estimate link throughput alongside the device's
    /// (NTP-adjusted) send timestamp embedded in the payload.
    pub fn handle_device_result(&self, buf: &[u8], received_at: f64) -> Result<SplitIndex, EdgeError> {
        let report = split_wire::parse_device_report(buf).inspect_err(|_| {
            self.telemetry.record(ErrorCategory::Parse);
        })?;

        if self.registry.get(&report.client_id).is_none() {
            self.telemetry.record(ErrorCategory::UnknownClient);
            return Err(EdgeError::UnknownClient(report.client_id.to_string()));
        }

        let num_layers = self.model.num_layers() as u32;
        let device_split = SplitIndex::from_wire(report.k_raw, num_layers);

        for (i, &t) in report.per_layer_device_times.iter().enumerate() {
            let layer = LayerIndex(i as u32);
            if let Err(e) = self.timing.update_device(layer, t as f64) {
                tracing::warn!(layer = i, error = %e, "failed to record device timing");
                continue;
            }
            self.variance.lock().unwrap().add_device_measurement(layer, t as f64);
        }

        let activation = Tensor::new(vec![report.activation.len()], report.activation.clone());
        let prediction = split_executor::run_suffix(
            device_split,
            activation,
            &self.model,
            self.runtime.as_ref(),
            &self.timing,
            &self.variance,
        )
        .inspect_err(|_| {
            self.telemetry.record(ErrorCategory::Runtime);
        })?;
        let _ = prediction;

        let payload_bytes = report.activation.len() as f64 * 4.0;
        let latency = received_at - report.timestamp;
        let avg_speed = if latency > 0.0 { payload_bytes / latency } else { f64::MIN_POSITIVE };

        let snapshot = self.timing.snapshot();
        let optimization = split_optimizer::optimize(
            &snapshot.device,
            &snapshot.edge,
            &snapshot.sizes,
            NetworkCost::AvgSpeedBytesPerSec(avg_speed),
        )
        .map_err(|e| EdgeError::Internal(Box::new(e)))?;

        // The refresher overrides what's reported back, not just what's
        // returned here: `offloading_layer` must answer with the same
        // decision, so the registry records the post-refresher value.
        let decision = if self.refresher.fires() {
            tracing::debug!(client_id = %report.client_id, "local-inference refresher fired");
            SplitIndex::Local
        } else {
            optimization.best_k
        };
        self.registry.record_split(&report.client_id, decision);

        let record = EvaluationRecord {
            timestamp_send: report.timestamp,
            timestamp_recv: received_at,
            client_id: report.client_id.to_string(),
            message_id: report.message_id.clone(),
            k: report.k_raw,
            activation_bytes: report.activation.len() as u32 * 4,
            per_layer_device_times: report.per_layer_device_times.clone(),
        };
        if let Err(e) = self.journal.append(&record) {
            tracing::error!(error = %e, "failed to append evaluation record");
        }

        if let Err(e) =
            self.timing.persist(&self.device_timings_path, &self.edge_timings_path, &self.layer_sizes_path)
        {
            tracing::error!(error = %e, "failed to persist timing store");
        }

        if self.variance.lock().unwrap().should_retest_offloading() {
            tracing::warn!("inference time variance detected, offloading plan re-evaluated this round");
        }

        Ok(decision)
    }

    /// Read-only: the last split index computed for `client_id`, or the
    /// default model's configured `last_offloading_layer` if the client has
    /// never reported.
    pub fn last_split(&self, client_id: &ClientId) -> SplitIndex {
        self.registry.get(client_id).map(|r| r.last_k).unwrap_or(self.default_split)
    }

    /// The model assigned to `client_id`, for callers (the transport
    /// layer's `device_input` route) that need the model's configured
    /// frame dimensions to decode a diagnostic image.
    pub fn model_name_for(&self, client_id: &ClientId) -> Option<String> {
        self.registry.get(client_id).map(|r| r.model_name)
    }
}
