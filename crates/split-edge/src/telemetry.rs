//! Per-category dropped-report counters: every malformed or rejected
//! report gets counted here. Plain atomics rather than a metrics crate —
//! this system's ambient stack carries `tracing` for structured logs and
//! these counters are exposed directly to tests and to the transport
//! layer's periodic log line, not to an external metrics backend.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    Parse,
    Runtime,
    UnknownClient,
}

#[derive(Default)]
pub struct Telemetry {
    transport: AtomicU64,
    parse: AtomicU64,
    runtime: AtomicU64,
    unknown_client: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::Transport => &self.transport,
            ErrorCategory::Parse => &self.parse,
            ErrorCategory::Runtime => &self.runtime,
            ErrorCategory::UnknownClient => &self.unknown_client,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            transport: self.transport.load(Ordering::Relaxed),
            parse: self.parse.load(Ordering::Relaxed),
            runtime: self.runtime.load(Ordering::Relaxed),
            unknown_client: self.unknown_client.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    pub transport: u64,
    pub parse: u64,
    pub runtime: u64,
    pub unknown_client: u64,
}
