//! Fleet-wide message broadcast

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ApiState;
use super::response::ApiError;
use crate::devices::{TaskKind, TaskResult};

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub contact: String,
    pub message: String,
    /// Forwarded as-is; each device falls back to its own default when absent
    #[serde(default)]
    pub app_type: Option<String>,
}

/// Per-device submission outcomes
#[derive(Serialize)]
pub struct BroadcastResponse {
    pub success: bool,
    pub data: IndexMap<String, TaskResult>,
    pub device_count: usize,
}

/// Build broadcast route
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/broadcast", post(broadcast))
        .with_state(state)
}

/// Send one message to the same contact on every online device
async fn broadcast(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<Json<BroadcastResponse>, ApiError> {
    let Json(req) = body?;
    ApiError::require("contact", &req.contact)?;

    let mut params = json!({ "contact": req.contact, "message": req.message });
    if let Some(app_type) = req.app_type {
        params["app_type"] = json!(app_type);
    }

    let results = state.registry.broadcast(TaskKind::SendMessage, params).await;
    Ok(Json(BroadcastResponse {
        success: true,
        device_count: results.len(),
        data: results,
    }))
}
