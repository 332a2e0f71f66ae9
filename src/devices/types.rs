//! Task, result and device types shared by the client and registry

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An automation action understood by the on-device task endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SendMessage,
    ReadMessages,
    CreateGroup,
    InviteToGroup,
    RemoveFromGroup,
    GetGroupMembers,
    GetContactList,
    Status,
    DumpUi,
}

impl TaskKind {
    /// Endpoint path for this action
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::SendMessage => "/api/send_message",
            Self::ReadMessages => "/api/read_messages",
            Self::CreateGroup => "/api/create_group",
            Self::InviteToGroup => "/api/invite_to_group",
            Self::RemoveFromGroup => "/api/remove_from_group",
            Self::GetGroupMembers => "/api/get_group_members",
            Self::GetContactList => "/api/get_contact_list",
            Self::Status => "/api/status",
            Self::DumpUi => "/api/dump_ui",
        }
    }

    /// Whether the action is submitted with a JSON body (POST)
    ///
    /// Status and dump-ui are plain GET queries and ignore parameters.
    #[must_use]
    pub const fn takes_body(self) -> bool {
        !matches!(self, Self::Status | Self::DumpUi)
    }

    /// Whether the device answers synchronously instead of handing out a task id
    #[must_use]
    pub const fn is_synchronous(self) -> bool {
        matches!(self, Self::GetContactList | Self::Status | Self::DumpUi)
    }

    /// Whether the device holds the request open for a long internal budget
    ///
    /// Contact listing scrolls the whole address book on the device, which
    /// can take up to ~90s before the endpoint replies.
    #[must_use]
    pub const fn is_long_running(self) -> bool {
        matches!(self, Self::GetContactList)
    }
}

/// Why the client synthesized or classified a failed result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Endpoint unreachable after all retry attempts
    ConnectionFailure,
    /// No terminal result within the allotted time
    Timeout,
    /// Endpoint returned a well-formed failure
    RemoteRejection,
    /// Endpoint returned something that is not the expected JSON
    ProtocolError,
}

/// Outcome of a task, or of a single endpoint exchange
///
/// Endpoint replies (`{code, success, message, data}`), terminal task results
/// (`{task_id, success, message, data}`) and failures synthesized by the
/// client all share this shape, so callers only ever check `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureKind>,
}

impl TaskResult {
    /// Build a failed result classified by the client
    #[must_use]
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: Value::Null,
            task_id: None,
            code: None,
            error: Some(kind),
        }
    }

    /// Task id handed out by the endpoint when it accepted an asynchronous task
    #[must_use]
    pub fn accepted_task_id(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.data
            .get("task_id")
            .and_then(Value::as_str)
            .or(self.task_id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Device-reported automation service status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(default)]
    pub accessibility_enabled: bool,
    #[serde(default)]
    pub current_package: String,
    #[serde(default)]
    pub current_class: String,
    #[serde(default)]
    pub task_queue_size: u32,
    #[serde(default)]
    pub http_server: bool,
}

/// Registration of a device in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub id: String,
    pub endpoint_address: String,
    pub display_name: Option<String>,
    /// App variant used when a call does not name one
    pub target_app: Option<String>,
    pub adb_serial: Option<String>,
}

impl DeviceRegistration {
    /// Registration with only the required fields
    #[must_use]
    pub fn new(id: impl Into<String>, endpoint_address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint_address: endpoint_address.into(),
            display_name: None,
            target_app: None,
            adb_serial: None,
        }
    }

    /// Set the human label
    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the default app variant
    #[must_use]
    pub fn target_app(mut self, app: impl Into<String>) -> Self {
        self.target_app = Some(app.into());
        self
    }
}

/// Public view of a registered device (no client handle)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub display_name: String,
    pub endpoint_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adb_serial: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths_follow_endpoint_contract() {
        assert_eq!(TaskKind::SendMessage.path(), "/api/send_message");
        assert_eq!(TaskKind::GetGroupMembers.path(), "/api/get_group_members");
        assert_eq!(TaskKind::GetContactList.path(), "/api/get_contact_list");
        assert_eq!(TaskKind::Status.path(), "/api/status");
    }

    #[test]
    fn only_queries_skip_the_body() {
        assert!(TaskKind::ReadMessages.takes_body());
        assert!(TaskKind::GetContactList.takes_body());
        assert!(!TaskKind::Status.takes_body());
        assert!(!TaskKind::DumpUi.takes_body());
    }

    #[test]
    fn contact_list_is_the_long_call() {
        assert!(TaskKind::GetContactList.is_long_running());
        assert!(TaskKind::GetContactList.is_synchronous());
        assert!(!TaskKind::ReadMessages.is_long_running());
        assert!(!TaskKind::ReadMessages.is_synchronous());
    }

    #[test]
    fn parses_accepted_submission() {
        let reply: TaskResult = serde_json::from_value(json!({
            "code": 200,
            "success": true,
            "message": "submitted",
            "data": {"task_id": "a1b2c3d4"}
        }))
        .unwrap();

        assert_eq!(reply.code, Some(200));
        assert_eq!(reply.accepted_task_id(), Some("a1b2c3d4"));
        assert!(reply.error.is_none());
    }

    #[test]
    fn rejected_submission_has_no_task_id() {
        let reply: TaskResult = serde_json::from_value(json!({
            "success": false,
            "message": "missing contact",
            "data": {"task_id": "ignored"}
        }))
        .unwrap();

        assert_eq!(reply.accepted_task_id(), None);
    }

    #[test]
    fn terminal_result_carries_task_id_field() {
        let reply: TaskResult = serde_json::from_value(json!({
            "task_id": "t1",
            "success": true,
            "message": "done",
            "data": "[hello]"
        }))
        .unwrap();

        assert_eq!(reply.task_id.as_deref(), Some("t1"));
        assert_eq!(reply.data, json!("[hello]"));
    }

    #[test]
    fn failure_serializes_error_kind() {
        let result = TaskResult::failure(FailureKind::Timeout, "task timed out (60s): t1");
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "timeout");
        assert!(value.get("data").is_none());
        assert!(value.get("task_id").is_none());
    }

    #[test]
    fn status_fields_default_when_absent() {
        let status: DeviceStatus =
            serde_json::from_value(json!({"accessibility_enabled": true})).unwrap();

        assert!(status.accessibility_enabled);
        assert_eq!(status.task_queue_size, 0);
        assert!(status.current_package.is_empty());
    }
}
