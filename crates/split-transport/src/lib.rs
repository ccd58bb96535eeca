//! HTTP binding (C8) over the `MessageBus` seam `split-edge` exposes, plus
//! the bounded worker pool (C12) suffix execution is dispatched through.
//! This is the only crate in the workspace that knows HTTP exists;
//! swapping in a `websocket`/`mqtt` binding later means adding a sibling
//! crate, not touching `split-edge`.

mod routes;
mod state;
mod worker_pool;

pub use state::AppState;
pub use worker_pool::{WorkerPool, WorkerPoolError};

use axum::routing::{get, post};
use axum::Router;

/// Logical route names map to configurable paths; defaults match the
/// names themselves.
#[derive(Debug, Clone)]
pub struct RoutePaths {
    pub registration: String,
    pub device_input: String,
    pub device_inference_result: String,
    pub offloading_layer: String,
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self {
            registration: "/registration".to_string(),
            device_input: "/device_input".to_string(),
            device_inference_result: "/device_inference_result".to_string(),
            offloading_layer: "/offloading_layer".to_string(),
        }
    }
}

pub fn build_router(state: AppState, paths: &RoutePaths) -> Router {
    Router::new()
        .route(&paths.registration, post(routes::registration))
        .route(&paths.device_input, post(routes::device_input))
        .route(&paths.device_inference_result, post(routes::device_inference_result))
        .route(&paths.offloading_layer, get(routes::offloading_layer))
        .with_state(state)
}
