//! HTTP client for one device's task endpoint
//!
//! Every action follows the same two-phase shape: submit, then (optionally)
//! poll `/api/task_result/{id}` until the device reports a terminal result.
//! Transport faults never escape as errors; they come back as failed
//! [`TaskResult`]s so callers have a single shape to inspect.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::retry::{self, RetryPolicy};
use super::types::{DeviceStatus, FailureKind, TaskKind, TaskResult};
use crate::{Error, Result};

/// Tunables shared by every device client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// HTTP timeout for ordinary calls
    pub request_timeout: Duration,
    /// HTTP timeout for long-running synchronous calls (contact listing)
    ///
    /// Must exceed the device's own internal budget for that call.
    pub long_request_timeout: Duration,
    /// Pause between task-result polls
    pub poll_interval: Duration,
    /// Overall wait for a terminal task result
    pub task_timeout: Duration,
    /// Transport retry policy
    pub retry: RetryPolicy,
    /// Hold a per-device lane across submit + poll
    pub serialize_per_device: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            long_request_timeout: Duration::from_secs(95),
            poll_interval: Duration::from_secs(2),
            task_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            serialize_per_device: true,
        }
    }
}

/// Reply of the synchronous status query
#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    success: bool,
    #[serde(default)]
    message: String,
    data: Option<DeviceStatus>,
}

/// Outcome of one HTTP attempt
enum Attempt {
    /// The endpoint produced an answer (or the request can never succeed)
    Done(TaskResult),
    /// Transport-level fault; carries the result to surface if no retry is left
    Transient(TaskResult),
}

/// Resilient caller bound to one device's task endpoint
#[derive(Debug)]
pub struct DeviceClient {
    api_base: String,
    default_app: Option<String>,
    settings: ClientSettings,
    client: Client,
    /// Serializes submit + poll sequences against this device
    lane: Mutex<()>,
}

impl DeviceClient {
    /// Create a client for the endpoint at `api_base`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_base: &str, settings: ClientSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.request_timeout)
            .user_agent(concat!("rpa-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            default_app: None,
            settings,
            client,
            lane: Mutex::new(()),
        })
    }

    /// Set the app variant injected into calls that name none
    #[must_use]
    pub fn with_default_app(mut self, app_type: Option<String>) -> Self {
        self.default_app = app_type;
        self
    }

    /// Base URL of the device endpoint
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    // -- two-phase task protocol --------------------------------------------

    /// Submit an action once (with transport retries) without waiting
    ///
    /// Returns the endpoint's acceptance (`data.task_id`) or rejection, or a
    /// synthesized failure when the device could not be reached.
    pub async fn submit(&self, kind: TaskKind, params: Value) -> TaskResult {
        let timeout = if kind.is_long_running() {
            self.settings.long_request_timeout
        } else {
            self.settings.request_timeout
        };

        if kind.takes_body() {
            let body = self.with_routing(params);
            self.exchange(Method::POST, kind.path(), Some(&body), timeout)
                .await
        } else {
            self.exchange(Method::GET, kind.path(), None, timeout).await
        }
    }

    /// Poll for the terminal result of `task_id` until `overall_timeout`
    ///
    /// Polls at the fixed poll interval. A poll that fails in transport counts
    /// as "not finished yet". Past the deadline a timeout failure naming the
    /// configured timeout is returned.
    pub async fn await_result(&self, task_id: &str, overall_timeout: Duration) -> TaskResult {
        let deadline = Instant::now() + overall_timeout;

        loop {
            let Ok(reply) =
                tokio::time::timeout_at(deadline, self.get_task_result(task_id)).await
            else {
                break;
            };

            if let Some(result) = terminal_result(&reply) {
                tracing::debug!(
                    device = %self.api_base,
                    task_id,
                    success = result.success,
                    "task finished"
                );
                return result;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }

        tracing::warn!(device = %self.api_base, task_id, ?overall_timeout, "task timed out");
        TaskResult {
            task_id: Some(task_id.to_string()),
            ..TaskResult::failure(
                FailureKind::Timeout,
                format!("task timed out ({}s): {task_id}", overall_timeout.as_secs_f64()),
            )
        }
    }

    /// Submit and, when `wait` is set and the device accepted a task, wait for it
    ///
    /// Synchronous actions never wait. A waiting flow holds this device's lane
    /// across submit and poll when per-device serialization is enabled;
    /// fire-and-forget submits bypass the lane and rely on the device's own
    /// task queue.
    pub async fn call(&self, kind: TaskKind, params: Value, wait: bool) -> TaskResult {
        if !wait || kind.is_synchronous() {
            return self.submit(kind, params).await;
        }

        let _lane = if self.settings.serialize_per_device {
            Some(self.lane.lock().await)
        } else {
            None
        };

        let submitted = self.submit(kind, params).await;
        let Some(task_id) = submitted.accepted_task_id().map(ToString::to_string) else {
            return submitted;
        };
        self.await_result(&task_id, self.settings.task_timeout).await
    }

    /// Fetch the current state of a task once
    pub async fn get_task_result(&self, task_id: &str) -> TaskResult {
        let path = format!("/api/task_result/{task_id}");
        self.exchange(Method::GET, &path, None, self.settings.request_timeout)
            .await
    }

    // -- status -------------------------------------------------------------

    /// Query the device's automation service status
    ///
    /// Single attempt, no retries: any failure means the device is offline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the device cannot be reached, answers
    /// with a non-success status or a body that is not a status envelope
    pub async fn query_status(&self) -> Result<DeviceStatus> {
        let url = format!("{}{}", self.api_base, TaskKind::Status.path());
        let offline = |e: &dyn std::fmt::Display| {
            Error::Connection(format!("cannot reach device at {}: {e}", self.api_base))
        };

        let response = self
            .client
            .get(&url)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(|e| offline(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(offline(&format!("HTTP {status}")));
        }

        let envelope: StatusEnvelope = response.json().await.map_err(|e| offline(&e))?;
        if !envelope.success {
            return Err(offline(&envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| offline(&"status reply without data"))
    }

    /// Whether the device answers and its accessibility service is enabled
    pub async fn is_ready(&self) -> bool {
        match self.query_status().await {
            Ok(status) => status.accessibility_enabled,
            Err(e) => {
                tracing::debug!(device = %self.api_base, error = %e, "device not ready");
                false
            }
        }
    }

    // -- typed actions ------------------------------------------------------

    /// Send a text message to a contact or group
    pub async fn send_message(
        &self,
        contact: &str,
        message: &str,
        app_type: Option<&str>,
        wait: bool,
    ) -> TaskResult {
        let params = with_app(json!({ "contact": contact, "message": message }), app_type);
        self.call(TaskKind::SendMessage, params, wait).await
    }

    /// Read the latest `count` messages of a conversation
    pub async fn read_messages(
        &self,
        contact: &str,
        count: u32,
        app_type: Option<&str>,
        wait: bool,
    ) -> TaskResult {
        let params = with_app(json!({ "contact": contact, "count": count }), app_type);
        self.call(TaskKind::ReadMessages, params, wait).await
    }

    /// Create a group chat with initial members
    pub async fn create_group(
        &self,
        group_name: &str,
        members: &[String],
        app_type: Option<&str>,
        wait: bool,
    ) -> TaskResult {
        let params = with_app(json!({ "group_name": group_name, "members": members }), app_type);
        self.call(TaskKind::CreateGroup, params, wait).await
    }

    /// Invite members into an existing group
    pub async fn invite_to_group(
        &self,
        group_name: &str,
        members: &[String],
        app_type: Option<&str>,
        wait: bool,
    ) -> TaskResult {
        let params = with_app(json!({ "group_name": group_name, "members": members }), app_type);
        self.call(TaskKind::InviteToGroup, params, wait).await
    }

    /// Remove members from a group
    pub async fn remove_from_group(
        &self,
        group_name: &str,
        members: &[String],
        app_type: Option<&str>,
        wait: bool,
    ) -> TaskResult {
        let params = with_app(json!({ "group_name": group_name, "members": members }), app_type);
        self.call(TaskKind::RemoveFromGroup, params, wait).await
    }

    /// List the members of a group
    pub async fn get_group_members(
        &self,
        group_name: &str,
        app_type: Option<&str>,
        wait: bool,
    ) -> TaskResult {
        let params = with_app(json!({ "group_name": group_name }), app_type);
        self.call(TaskKind::GetGroupMembers, params, wait).await
    }

    /// List contacts; the device answers synchronously after scrolling its address book
    pub async fn get_contact_list(&self, app_type: Option<&str>) -> TaskResult {
        let params = with_app(json!({}), app_type);
        self.call(TaskKind::GetContactList, params, false).await
    }

    /// Export the current control tree (id calibration)
    ///
    /// The device answers with the tree as text, or with a task id when the
    /// dump outlasts its short internal wait; the latter is polled to the end.
    pub async fn dump_ui(&self) -> TaskResult {
        let reply = self.submit(TaskKind::DumpUi, Value::Null).await;
        match reply.accepted_task_id().map(ToString::to_string) {
            Some(task_id) => self.await_result(&task_id, self.settings.task_timeout).await,
            None => reply,
        }
    }

    // -- transport ----------------------------------------------------------

    /// Fill in the device's default app variant when the caller named none
    fn with_routing(&self, params: Value) -> Value {
        let mut params = match params {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => return other,
        };

        if let Some(app) = &self.default_app {
            params
                .entry("app_type")
                .or_insert_with(|| Value::String(app.clone()));
        }

        Value::Object(params)
    }

    /// Run one HTTP exchange under the retry policy
    async fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> TaskResult {
        let url = format!("{}{path}", self.api_base);
        let policy = &self.settings.retry;
        let mut attempt = 1;

        loop {
            match self.attempt(method.clone(), &url, body, timeout).await {
                Attempt::Done(result) => return result,
                Attempt::Transient(failure) => {
                    if !policy.should_retry(attempt) {
                        tracing::error!(
                            url = %url,
                            attempts = attempt,
                            message = %failure.message,
                            "device call failed"
                        );
                        return failure;
                    }

                    tracing::warn!(
                        url = %url,
                        attempt,
                        message = %failure.message,
                        "device call failed, retrying"
                    );
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Attempt {
        let mut request = self.client.request(method, url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return self.transport_failure(&e),
        };

        let status = response.status();
        match response.bytes().await {
            Ok(bytes) => interpret(status, &bytes),
            Err(e) => self.transport_failure(&e),
        }
    }

    fn transport_failure(&self, err: &reqwest::Error) -> Attempt {
        if retry::is_transient(err) {
            Attempt::Transient(TaskResult::failure(
                retry::failure_kind(err),
                format!("cannot reach device at {}: {err}", self.api_base),
            ))
        } else {
            Attempt::Done(TaskResult::failure(
                FailureKind::ProtocolError,
                format!("request to {} failed: {err}", self.api_base),
            ))
        }
    }
}

/// Add `app_type` to a parameter object when given
fn with_app(mut params: Value, app_type: Option<&str>) -> Value {
    if let (Some(app), Value::Object(map)) = (app_type, &mut params) {
        map.insert("app_type".to_string(), Value::String(app.to_string()));
    }
    params
}

/// Turn a raw HTTP reply into a result
fn interpret(status: StatusCode, body: &[u8]) -> Attempt {
    let value = match serde_json::from_slice::<Value>(body) {
        Ok(value) if value.is_object() => value,
        parsed => {
            if retry::is_recoverable(status.as_u16()) {
                return Attempt::Transient(TaskResult {
                    code: Some(status.as_u16()),
                    ..TaskResult::failure(
                        FailureKind::ProtocolError,
                        format!("device answered HTTP {status} without a readable body"),
                    )
                });
            }
            let detail = parsed.err().map_or_else(
                || "expected a JSON object".to_string(),
                |e| e.to_string(),
            );
            return Attempt::Done(TaskResult {
                code: Some(status.as_u16()),
                ..TaskResult::failure(
                    FailureKind::ProtocolError,
                    format!("malformed device response (HTTP {status}): {detail}"),
                )
            });
        }
    };

    if !status.is_success() {
        let message = value
            .get("message")
            .or_else(|| value.get("detail"))
            .and_then(Value::as_str)
            .map_or_else(|| format!("HTTP {status}"), ToString::to_string);
        return Attempt::Done(TaskResult {
            data: value.get("data").cloned().unwrap_or_default(),
            code: Some(status.as_u16()),
            ..TaskResult::failure(FailureKind::RemoteRejection, message)
        });
    }

    Attempt::Done(parse_result(value))
}

/// Parse a result object, classifying a reported failure as a rejection
fn parse_result(value: Value) -> TaskResult {
    match serde_json::from_value::<TaskResult>(value) {
        Ok(mut result) => {
            if !result.success && result.error.is_none() {
                result.error = Some(FailureKind::RemoteRejection);
            }
            result
        }
        Err(e) => TaskResult::failure(
            FailureKind::ProtocolError,
            format!("malformed device result: {e}"),
        ),
    }
}

/// Extract the terminal result from a task-result poll, if the task finished
///
/// The endpoint keeps `data` absent until the task is done; a finished task
/// reports an object with a boolean `success`.
fn terminal_result(reply: &TaskResult) -> Option<TaskResult> {
    reply
        .data
        .get("success")
        .and_then(Value::as_bool)
        .map(|_| parse_result(reply.data.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(attempt: Attempt) -> TaskResult {
        match attempt {
            Attempt::Done(result) => result,
            Attempt::Transient(result) => panic!("expected final result, got {result:?}"),
        }
    }

    fn client_with_app(app: Option<&str>) -> DeviceClient {
        DeviceClient::new("http://10.0.0.5:9527/", ClientSettings::default())
            .unwrap()
            .with_default_app(app.map(ToString::to_string))
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = client_with_app(None);
        assert_eq!(client.api_base(), "http://10.0.0.5:9527");
    }

    #[test]
    fn routing_fills_default_app() {
        let client = client_with_app(Some("wework"));
        let body = client.with_routing(json!({"contact": "Alice"}));
        assert_eq!(body["app_type"], "wework");
        assert_eq!(body["contact"], "Alice");
    }

    #[test]
    fn routing_keeps_explicit_app() {
        let client = client_with_app(Some("wework"));
        let body = client.with_routing(json!({"contact": "Alice", "app_type": "wechat"}));
        assert_eq!(body["app_type"], "wechat");
    }

    #[test]
    fn routing_without_default_leaves_params_alone() {
        let client = client_with_app(None);
        let body = client.with_routing(Value::Null);
        assert_eq!(body, json!({}));
    }

    #[test]
    fn with_app_only_when_given() {
        assert_eq!(with_app(json!({}), None), json!({}));
        assert_eq!(with_app(json!({}), Some("wechat")), json!({"app_type": "wechat"}));
    }

    #[test]
    fn accepted_reply_passes_through() {
        let body = br#"{"code":200,"success":true,"message":"ok","data":{"task_id":"t1"}}"#;
        let result = done(interpret(StatusCode::OK, body));
        assert!(result.success);
        assert_eq!(result.accepted_task_id(), Some("t1"));
    }

    #[test]
    fn error_status_with_json_is_rejection() {
        let body = br#"{"code":400,"success":false,"message":"missing contact"}"#;
        let result = done(interpret(StatusCode::BAD_REQUEST, body));
        assert!(!result.success);
        assert_eq!(result.error, Some(FailureKind::RemoteRejection));
        assert_eq!(result.code, Some(400));
        assert_eq!(result.message, "missing contact");
    }

    #[test]
    fn success_false_reply_is_rejection() {
        let body = br#"{"success":false,"message":"contact list failed"}"#;
        let result = done(interpret(StatusCode::OK, body));
        assert_eq!(result.error, Some(FailureKind::RemoteRejection));
    }

    #[test]
    fn non_json_reply_is_protocol_error() {
        let result = done(interpret(StatusCode::OK, b"<html>nope</html>"));
        assert_eq!(result.error, Some(FailureKind::ProtocolError));
    }

    #[test]
    fn json_without_success_is_protocol_error() {
        let result = done(interpret(StatusCode::OK, br#"{"message":"hi"}"#));
        assert_eq!(result.error, Some(FailureKind::ProtocolError));
    }

    #[test]
    fn unreadable_server_error_is_transient() {
        let attempt = interpret(StatusCode::BAD_GATEWAY, b"Bad Gateway");
        assert!(matches!(attempt, Attempt::Transient(_)));
    }

    #[test]
    fn server_error_with_json_is_final() {
        let body = br#"{"code":500,"success":false,"message":"executor crashed"}"#;
        let result = done(interpret(StatusCode::INTERNAL_SERVER_ERROR, body));
        assert_eq!(result.error, Some(FailureKind::RemoteRejection));
        assert_eq!(result.message, "executor crashed");
    }

    #[test]
    fn pending_poll_is_not_terminal() {
        let reply = parse_result(json!({"success": false, "message": "still running"}));
        assert!(terminal_result(&reply).is_none());
    }

    #[test]
    fn finished_poll_yields_inner_result() {
        let reply = parse_result(json!({
            "success": true,
            "message": "ok",
            "data": {"task_id": "t1", "success": false, "message": "contact not found", "data": ""}
        }));

        let result = terminal_result(&reply).unwrap();
        assert!(!result.success);
        assert_eq!(result.task_id.as_deref(), Some("t1"));
        assert_eq!(result.message, "contact not found");
        assert_eq!(result.error, Some(FailureKind::RemoteRejection));
    }
}
