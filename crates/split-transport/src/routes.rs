//! The four HTTP routes (C8), thin over the transport-agnostic
//! `MessageBus` seam in `split-edge`. Every handler maps domain errors to
//! the status classes fixed in the parent contract: 4xx for malformed or
//! unknown-client input, 5xx for internal/runtime failure, 503 when the
//! worker pool (C12) is saturated.

use crate::state::AppState;
use crate::worker_pool::WorkerPoolError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use split_core::ClientId;
use split_edge::{EdgeError, MessageBus};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_unix_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs_f64()
}

pub enum RouteError {
    Edge(EdgeError),
    Pool(WorkerPoolError),
    BadClientId(String),
}

impl From<EdgeError> for RouteError {
    fn from(e: EdgeError) -> Self {
        RouteError::Edge(e)
    }
}

impl From<WorkerPoolError> for RouteError {
    fn from(e: WorkerPoolError) -> Self {
        RouteError::Pool(e)
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            RouteError::Edge(EdgeError::BadWireFormat(e)) => (StatusCode::BAD_REQUEST, e.to_string()),
            RouteError::Edge(EdgeError::UnknownClient(id)) => {
                (StatusCode::NOT_FOUND, format!("client '{id}' has never registered"))
            }
            RouteError::Edge(EdgeError::Runtime(e)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            RouteError::Edge(EdgeError::Internal(e)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            RouteError::Pool(WorkerPoolError::Saturated { max_concurrent }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("worker pool saturated (max_concurrent_suffix_runs={max_concurrent})"),
            ),
            RouteError::Pool(WorkerPoolError::Join(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "worker task panicked".to_string())
            }
            RouteError::BadClientId(id) => {
                (StatusCode::BAD_REQUEST, format!("invalid client_id '{id}'"))
            }
        };
        tracing::warn!(status = %status, message = %message, "request rejected");
        (status, Json(ErrorBody { message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
pub struct RegistrationRequest {
    client_id: Option<String>,
}

#[derive(Serialize)]
pub struct RegistrationResponse {
    message: String,
    client_id: String,
    model_name: String,
}

pub async fn registration(
    State(state): State<AppState>,
    Json(req): Json<RegistrationRequest>,
) -> Result<Json<RegistrationResponse>, RouteError> {
    let outcome = state.coordinator.on_register(req.client_id)?;
    tracing::info!(client_id = %outcome.client_id, model = %outcome.model_name, "client registered");
    Ok(Json(RegistrationResponse {
        message: "registered".to_string(),
        client_id: outcome.client_id.to_string(),
        model_name: outcome.model_name,
    }))
}

#[derive(Deserialize)]
pub struct DeviceInputQuery {
    client_id: String,
}

#[derive(Serialize)]
pub struct AckResponse {
    message: String,
}

pub async fn device_input(
    State(state): State<AppState>,
    Query(q): Query<DeviceInputQuery>,
    body: axum::body::Bytes,
) -> Result<Json<AckResponse>, RouteError> {
    let client_id = ClientId::new(q.client_id.clone())
        .map_err(|_| RouteError::BadClientId(q.client_id.clone()))?;
    let model_name = state
        .coordinator
        .model_name_for(&client_id)
        .ok_or_else(|| RouteError::Edge(EdgeError::UnknownClient(q.client_id.clone())))?;
    let (height, width) = state.frame_size_for(&model_name).unwrap_or(state.default_frame_size);
    state.coordinator.on_input(&body, height, width)?;
    Ok(Json(AckResponse { message: "received".to_string() }))
}

pub async fn device_inference_result(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<AckResponse>, RouteError> {
    let coordinator = state.coordinator.clone();
    let received_at = now_unix_secs();
    let buf = body.to_vec();
    let outcome = state.pool.try_run(move || coordinator.on_result(&buf, received_at)).await?;
    outcome?;
    Ok(Json(AckResponse { message: "accepted".to_string() }))
}

#[derive(Deserialize)]
pub struct OffloadingLayerQuery {
    client_id: String,
}

#[derive(Serialize)]
pub struct OffloadingLayerResponse {
    offloading_layer_index: i32,
}

pub async fn offloading_layer(
    State(state): State<AppState>,
    Query(q): Query<OffloadingLayerQuery>,
) -> Result<Json<OffloadingLayerResponse>, RouteError> {
    let client_id = ClientId::new(q.client_id.clone())
        .map_err(|_| RouteError::BadClientId(q.client_id.clone()))?;
    let split = state.coordinator.last_split(&client_id);
    Ok(Json(OffloadingLayerResponse { offloading_layer_index: split.to_wire() }))
}
