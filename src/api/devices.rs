//! Device catalog endpoints
//!
//! Listing, online filtering, status and control-tree export

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;

use super::ApiState;
use super::response::{ApiError, Envelope};
use crate::devices::{DeviceInfo, DeviceStatus, TaskResult};

/// Online device ids with their count
#[derive(Serialize)]
pub struct OnlineResponse {
    pub success: bool,
    pub data: Vec<String>,
    pub count: usize,
}

/// Build device routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_devices))
        .route("/online", get(list_online))
        .route("/{device_id}/status", get(device_status))
        .route("/{device_id}/dump_ui", get(dump_ui))
        .with_state(state)
}

/// List all registered devices
async fn list_devices(State(state): State<Arc<ApiState>>) -> Envelope<Vec<DeviceInfo>> {
    Envelope::ok(state.registry.list_all().await)
}

/// List devices whose automation service is ready
async fn list_online(State(state): State<Arc<ApiState>>) -> axum::Json<OnlineResponse> {
    let online = state.registry.list_online().await;
    axum::Json(OnlineResponse {
        success: true,
        count: online.len(),
        data: online,
    })
}

/// Query one device's status
async fn device_status(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Result<Envelope<DeviceStatus>, ApiError> {
    let status = state.registry.status(&device_id).await?;
    Ok(Envelope::ok(status))
}

/// Export a device's current control tree
async fn dump_ui(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<String>,
) -> Result<Envelope<TaskResult>, ApiError> {
    let client = state.registry.resolve(&device_id).await?;
    Ok(Envelope::ok(client.dump_ui().await))
}
