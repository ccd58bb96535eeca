//! The edge-side coordinator (C6): the process that owns a model's timing
//! store, variance detector, client registry, and evaluation journal, and
//! decides where the next split point is after every device report.
//!
//! Transport-agnostic by design: `Coordinator` implements `MessageBus`, and
//! `split-transport` is the only crate in this workspace that knows HTTP
//! exists.

mod coordinator;
mod error;
mod refresher;
mod telemetry;

pub use coordinator::{Coordinator, RegistrationOutcome};
pub use error::EdgeError;
pub use refresher::Refresher;
pub use telemetry::{ErrorCategory, Telemetry, TelemetrySnapshot};

use split_core::SplitIndex;

/// The transport-independent seam every binding (HTTP, and whatever the
/// `websocket`/`mqtt` config values eventually grow into) drives the
/// coordinator through.
pub trait MessageBus {
    /// A device announcing itself, optionally with a preferred id.
    fn on_register(&self, client_id: Option<String>) -> Result<RegistrationOutcome, EdgeError>;

    /// A diagnostic RGB565 frame; informational only, never on the
    /// inference hot path.
    fn on_input(&self, buf: &[u8], height: u32, width: u32) -> Result<(), EdgeError>;

    /// A completed device inference round trip. Returns the split index
    /// the device should use for its next inference.
    fn on_result(&self, buf: &[u8], received_at: f64) -> Result<SplitIndex, EdgeError>;

    /// Encodes a split decision the way the device expects it back: a
    /// single little-endian `i32`.
    fn reply(&self, split: SplitIndex) -> Vec<u8>;
}

impl MessageBus for Coordinator {
    fn on_register(&self, client_id: Option<String>) -> Result<RegistrationOutcome, EdgeError> {
        self.register(client_id)
    }

    fn on_input(&self, buf: &[u8], height: u32, width: u32) -> Result<(), EdgeError> {
        self.handle_device_input(buf, height, width)
    }

    fn on_result(&self, buf: &[u8], received_at: f64) -> Result<SplitIndex, EdgeError> {
        self.handle_device_result(buf, received_at)
    }

    fn reply(&self, split: SplitIndex) -> Vec<u8> {
        split.to_wire().to_le_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use split_core::Model;
    use split_journal::EvaluationJournal;
    use split_runtime::MockRuntime;
    use split_timing::TimingStore;
    use split_variance::VarianceDetector;

    fn build_bus() -> Coordinator {
        let model = Model::linear_chain("bus-model", &[32, 32]).unwrap();
        let timing = TimingStore::new(vec![0.01, 0.01], vec![0.01, 0.01], vec![32, 32]);
        let variance = VarianceDetector::new(2);
        let dir = std::env::temp_dir();
        let tag = format!("{:?}", std::thread::current().id());
        let path = dir.join(format!("split_edge_bus_test_{tag}"));
        let _ = std::fs::remove_file(&path);
        let journal = EvaluationJournal::open(&path).unwrap();
        let runtime = Box::new(MockRuntime::identity(2));
        Coordinator::new(
            model,
            timing,
            variance,
            "bus-model",
            journal,
            runtime,
            0.0,
            1,
            dir.join(format!("device_timings_bus_{tag}.json")),
            dir.join(format!("edge_timings_bus_{tag}.json")),
            dir.join(format!("layer_sizes_bus_{tag}.json")),
        )
    }

    #[test]
    fn reply_round_trips_through_wire_convention() {
        let bus = build_bus();
        assert_eq!(bus.reply(SplitIndex::Local), (-1i32).to_le_bytes().to_vec());
        assert_eq!(bus.reply(SplitIndex::Layer(1)), 1i32.to_le_bytes().to_vec());
    }

    #[test]
    fn message_bus_register_matches_direct_call() {
        let bus = build_bus();
        let outcome = bus.on_register(Some("dev9".into())).unwrap();
        assert_eq!(outcome.client_id.as_str(), "dev9");
    }
}
