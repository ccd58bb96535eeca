//! Client registry (C7): per-client model assignment and last-known split
//! point, resilient to disconnects — records are never removed, only
//! updated, so a client that drops off network and comes back keeps its
//! assignment.

use split_core::{ClientId, ClientRecord, SplitIndex};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_unix_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs_f64()
}

/// Model-assignment policy, pulled out of `ClientRegistry` so a future
/// load-aware or capability-aware policy can be swapped in without
/// touching the registration protocol.
pub trait ModelAssignmentPolicy: Send + Sync {
    fn assign(&self, client_id: &ClientId) -> String;
}

/// Baseline policy: every client gets the same configured model.
pub struct DefaultModelPolicy {
    model_name: String,
}

impl DefaultModelPolicy {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self { model_name: model_name.into() }
    }
}

impl ModelAssignmentPolicy for DefaultModelPolicy {
    fn assign(&self, _client_id: &ClientId) -> String {
        self.model_name.clone()
    }
}

pub struct ClientRegistry {
    policy: Box<dyn ModelAssignmentPolicy>,
    clients: RwLock<HashMap<ClientId, ClientRecord>>,
}

impl ClientRegistry {
    pub fn new(policy: impl ModelAssignmentPolicy + 'static) -> Self {
        Self { policy: Box::new(policy), clients: RwLock::new(HashMap::new()) }
    }

    /// Idempotent: a client seen before keeps its original model
    /// assignment and split index; only `last_seen` advances. A new
    /// client gets a fresh assignment from the policy.
    pub fn register(&self, client_id: ClientId) -> ClientRecord {
        let mut clients = self.clients.write().unwrap();
        if let Some(record) = clients.get_mut(&client_id) {
            record.last_seen_unix_secs = now_unix_secs();
            return record.clone();
        }
        let model_name = self.policy.assign(&client_id);
        tracing::info!(client_id = %client_id, model = %model_name, "registered new client");
        let record = ClientRecord {
            client_id: client_id.clone(),
            model_name,
            last_seen_unix_secs: now_unix_secs(),
            last_k: SplitIndex::Local,
        };
        clients.insert(client_id, record.clone());
        record
    }

    /// Updates the last-known split index and touches `last_seen`. Does
    /// nothing (and is a no-op, not an error) if the client was never
    /// registered — an out-of-order report from a disconnected client
    /// must not crash the handler.
    pub fn record_split(&self, client_id: &ClientId, k: SplitIndex) {
        let mut clients = self.clients.write().unwrap();
        if let Some(record) = clients.get_mut(client_id) {
            record.last_k = k;
            record.last_seen_unix_secs = now_unix_secs();
        }
    }

    pub fn get(&self, client_id: &ClientId) -> Option<ClientRecord> {
        self.clients.read().unwrap().get(client_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
