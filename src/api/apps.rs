//! Per-app chat automation endpoints
//!
//! Each configured [`AppNamespace`] gets the same route group under
//! `/api/{prefix}`. Handlers differ only in the `app_type` they forward, so
//! adding an app is a config change.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiState;
use super::response::{ApiError, Envelope};
use crate::config::AppNamespace;
use crate::devices::{DeviceClient, DeviceRegistry, TaskResult};

/// State for one namespace's routes
pub struct NamespaceState {
    registry: Arc<DeviceRegistry>,
    app: AppNamespace,
}

impl NamespaceState {
    async fn device(&self, device_id: &str) -> Result<Arc<DeviceClient>, ApiError> {
        ApiError::require("device_id", device_id)?;
        Ok(self.registry.resolve(device_id).await?)
    }

    fn app_type(&self) -> Option<&str> {
        Some(self.app.app_type.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct DeviceRequest {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub device_id: String,
    pub contact: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ReadMessagesRequest {
    pub device_id: String,
    pub contact: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

const fn default_count() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub device_id: String,
    #[serde(default)]
    pub group_name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GroupMembersRequest {
    pub device_id: String,
    pub group_name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub device_id: String,
    pub group_name: String,
}

/// Contact listing reply
///
/// A device that returns a name list is flattened into the reply; anything
/// else is wrapped in the standard envelope.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ContactsResponse {
    List {
        success: bool,
        data: Vec<Value>,
        message: String,
    },
    Wrapped(Envelope<TaskResult>),
}

impl From<TaskResult> for ContactsResponse {
    fn from(result: TaskResult) -> Self {
        match result.data {
            Value::Array(names) => Self::List {
                success: result.success,
                data: names,
                message: result.message,
            },
            _ => Self::Wrapped(Envelope::ok(result)),
        }
    }
}

/// List configured app namespaces
async fn list_apps(State(state): State<Arc<ApiState>>) -> Envelope<Vec<AppNamespace>> {
    Envelope::ok(state.apps.clone())
}

/// Build the `/apps` listing route
pub fn listing_router(state: Arc<ApiState>) -> Router {
    Router::new().route("/apps", get(list_apps)).with_state(state)
}

/// Build the route group for one app namespace
pub fn router(registry: Arc<DeviceRegistry>, app: AppNamespace) -> Router {
    Router::new()
        .route("/contacts", post(contacts))
        .route("/send_message", post(send_message))
        .route("/read_messages", post(read_messages))
        .route("/create_group", post(create_group))
        .route("/invite_to_group", post(invite_to_group))
        .route("/remove_from_group", post(remove_from_group))
        .route("/group_members", post(group_members))
        .with_state(Arc::new(NamespaceState { registry, app }))
}

async fn contacts(
    State(ns): State<Arc<NamespaceState>>,
    body: Result<Json<DeviceRequest>, JsonRejection>,
) -> Result<Json<ContactsResponse>, ApiError> {
    let Json(req) = body?;
    let device = ns.device(&req.device_id).await?;

    tracing::info!(app = %ns.app.prefix, device_id = %req.device_id, "listing contacts");
    let result = device.get_contact_list(ns.app_type()).await;
    Ok(Json(ContactsResponse::from(result)))
}

async fn send_message(
    State(ns): State<Arc<NamespaceState>>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Envelope<TaskResult>, ApiError> {
    let Json(req) = body?;
    ApiError::require("contact", &req.contact)?;
    let device = ns.device(&req.device_id).await?;

    let result = device
        .send_message(&req.contact, &req.message, ns.app_type(), false)
        .await;
    Ok(Envelope::ok(result))
}

async fn read_messages(
    State(ns): State<Arc<NamespaceState>>,
    body: Result<Json<ReadMessagesRequest>, JsonRejection>,
) -> Result<Envelope<TaskResult>, ApiError> {
    let Json(req) = body?;
    ApiError::require("contact", &req.contact)?;
    let device = ns.device(&req.device_id).await?;

    let result = device
        .read_messages(&req.contact, req.count, ns.app_type(), true)
        .await;
    Ok(Envelope::ok(result))
}

async fn create_group(
    State(ns): State<Arc<NamespaceState>>,
    body: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Result<Envelope<TaskResult>, ApiError> {
    let Json(req) = body?;
    let device = ns.device(&req.device_id).await?;

    let result = device
        .create_group(&req.group_name, &req.members, ns.app_type(), false)
        .await;
    Ok(Envelope::ok(result))
}

async fn invite_to_group(
    State(ns): State<Arc<NamespaceState>>,
    body: Result<Json<GroupMembersRequest>, JsonRejection>,
) -> Result<Envelope<TaskResult>, ApiError> {
    let Json(req) = body?;
    ApiError::require("group_name", &req.group_name)?;
    let device = ns.device(&req.device_id).await?;

    let result = device
        .invite_to_group(&req.group_name, &req.members, ns.app_type(), false)
        .await;
    Ok(Envelope::ok(result))
}

async fn remove_from_group(
    State(ns): State<Arc<NamespaceState>>,
    body: Result<Json<GroupMembersRequest>, JsonRejection>,
) -> Result<Envelope<TaskResult>, ApiError> {
    let Json(req) = body?;
    ApiError::require("group_name", &req.group_name)?;
    let device = ns.device(&req.device_id).await?;

    let result = device
        .remove_from_group(&req.group_name, &req.members, ns.app_type(), false)
        .await;
    Ok(Envelope::ok(result))
}

async fn group_members(
    State(ns): State<Arc<NamespaceState>>,
    body: Result<Json<GroupRequest>, JsonRejection>,
) -> Result<Envelope<TaskResult>, ApiError> {
    let Json(req) = body?;
    ApiError::require("group_name", &req.group_name)?;
    let device = ns.device(&req.device_id).await?;

    let result = device
        .get_group_members(&req.group_name, ns.app_type(), false)
        .await;
    Ok(Envelope::ok(result))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn contact_list_is_flattened() {
        let result = TaskResult {
            success: true,
            message: "ok".to_string(),
            data: json!(["Alice", "Bob"]),
            task_id: None,
            code: Some(200),
            error: None,
        };

        let value = serde_json::to_value(ContactsResponse::from(result)).unwrap();
        assert_eq!(value, json!({"success": true, "data": ["Alice", "Bob"], "message": "ok"}));
    }

    #[test]
    fn failed_contact_list_keeps_device_verdict() {
        let result = TaskResult {
            success: false,
            message: "scroll failed".to_string(),
            data: json!([]),
            task_id: None,
            code: None,
            error: None,
        };

        let value = serde_json::to_value(ContactsResponse::from(result)).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["data"], json!([]));
    }

    #[test]
    fn other_contact_replies_are_enveloped() {
        let result = TaskResult::failure(
            crate::devices::FailureKind::ConnectionFailure,
            "cannot reach device",
        );

        let value = serde_json::to_value(ContactsResponse::from(result)).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["success"], false);
        assert_eq!(value["data"]["error"], "connection_failure");
    }

    #[test]
    fn read_messages_count_defaults_to_ten() {
        let req: ReadMessagesRequest =
            serde_json::from_value(json!({"device_id": "d1", "contact": "Alice"})).unwrap();
        assert_eq!(req.count, 10);
    }

    #[test]
    fn create_group_name_is_optional() {
        let req: CreateGroupRequest =
            serde_json::from_value(json!({"device_id": "d1", "members": ["A", "B"]})).unwrap();
        assert!(req.group_name.is_empty());
        assert_eq!(req.members.len(), 2);
    }
}
