use crate::worker_pool::WorkerPool;
use split_edge::Coordinator;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared axum handler state. Cheaply `Clone`: everything behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub pool: Arc<WorkerPool>,
    frame_sizes: Arc<HashMap<String, (u32, u32)>>,
    pub default_frame_size: (u32, u32),
}

impl AppState {
    pub fn new(
        coordinator: Arc<Coordinator>,
        pool: Arc<WorkerPool>,
        frame_sizes: HashMap<String, (u32, u32)>,
        default_frame_size: (u32, u32),
    ) -> Self {
        Self { coordinator, pool, frame_sizes: Arc::new(frame_sizes), default_frame_size }
    }

    pub fn frame_size_for(&self, model_name: &str) -> Option<(u32, u32)> {
        self.frame_sizes.get(model_name).copied()
    }
}
