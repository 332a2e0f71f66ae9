//! Shared test utilities
//!
//! A mock device task endpoint served by axum on an ephemeral port, and a
//! TCP proxy that drops the first connections it accepts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rpa_gateway::{ClientSettings, RetryPolicy};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};

/// Knobs and counters of a mock device
#[derive(Default)]
pub struct MockState {
    /// Reported by `/api/status`
    pub accessibility_enabled: AtomicBool,
    /// Pending replies each task gives before its terminal result
    pub pending_polls: AtomicUsize,
    /// Tasks never finish
    pub never_finish: AtomicBool,
    /// Submissions are refused with HTTP 400 and a JSON body
    pub reject: AtomicBool,
    /// Submissions are answered with a non-JSON body
    pub garbage: AtomicBool,
    /// `dump_ui` hands out a task id instead of the tree
    pub slow_dump: AtomicBool,
    /// Delay before `get_contact_list` answers, in milliseconds
    pub contacts_delay_ms: AtomicU64,
    /// Names returned by `get_contact_list`
    pub contacts: Mutex<Vec<String>>,
    /// Every submission: (action, body)
    pub submissions: Mutex<Vec<(String, Value)>>,
    pub polls: AtomicUsize,
    /// Tasks accepted but not yet reported terminal
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    tasks: Mutex<HashMap<String, (String, usize)>>,
    next_id: AtomicUsize,
}

impl MockState {
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn last_submission(&self) -> Option<(String, Value)> {
        self.submissions.lock().unwrap().last().cloned()
    }

    fn accept(&self, action: String) -> String {
        let task_id = format!("t{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let pending = self.pending_polls.load(Ordering::SeqCst);
        self.tasks
            .lock()
            .unwrap()
            .insert(task_id.clone(), (action, pending));

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        task_id
    }
}

/// Running mock device endpoint
pub struct MockDevice {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockDevice {
    /// Start a ready device (accessibility enabled, tasks finish on first poll)
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        state.accessibility_enabled.store(true, Ordering::SeqCst);
        *state.contacts.lock().unwrap() = vec!["Alice".to_string(), "Bob".to_string()];

        let router = Router::new()
            .route("/api/status", get(status))
            .route("/api/dump_ui", get(dump_ui))
            .route("/api/task_result/{task_id}", get(task_result))
            .route("/api/{action}", post(submit))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, state }
    }

    /// Start a device whose accessibility service is off
    pub async fn start_disabled() -> Self {
        let device = Self::start().await;
        device.state.accessibility_enabled.store(false, Ordering::SeqCst);
        device
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

fn reply(code: u16, success: bool, message: &str, data: Option<Value>) -> Response {
    let mut body = json!({ "code": code, "success": success, "message": message });
    if let Some(data) = data {
        body["data"] = data;
    }
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

async fn status(State(state): State<Arc<MockState>>) -> Response {
    let queue = state.active.load(Ordering::SeqCst);
    reply(
        200,
        true,
        "ok",
        Some(json!({
            "accessibility_enabled": state.accessibility_enabled.load(Ordering::SeqCst),
            "current_package": "com.tencent.wework",
            "current_class": "WwMainActivity",
            "task_queue_size": queue,
            "http_server": true,
        })),
    )
}

async fn dump_ui(State(state): State<Arc<MockState>>) -> Response {
    if state.slow_dump.load(Ordering::SeqCst) {
        let task_id = state.accept("dump_ui".to_string());
        return reply(200, true, "running", Some(json!({ "task_id": task_id })));
    }
    reply(200, true, "ok", Some(json!("<hierarchy rotation=\"0\"/>")))
}

async fn submit(
    State(state): State<Arc<MockState>>,
    Path(action): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state
        .submissions
        .lock()
        .unwrap()
        .push((action.clone(), body));

    if state.garbage.load(Ordering::SeqCst) {
        return (StatusCode::OK, "<html>bad gateway page</html>").into_response();
    }
    if state.reject.load(Ordering::SeqCst) {
        return reply(400, false, "missing contact", None);
    }
    if action == "get_contact_list" {
        let delay = state.contacts_delay_ms.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let names = state.contacts.lock().unwrap().clone();
        return reply(200, true, "ok", Some(json!(names)));
    }

    let task_id = state.accept(action);
    reply(200, true, "submitted", Some(json!({ "task_id": task_id })))
}

async fn task_result(
    State(state): State<Arc<MockState>>,
    Path(task_id): Path<String>,
) -> Response {
    state.polls.fetch_add(1, Ordering::SeqCst);
    let pending = || reply(200, false, "task result not found or still running", None);

    if state.never_finish.load(Ordering::SeqCst) {
        return pending();
    }

    let mut tasks = state.tasks.lock().unwrap();
    let Some((action, remaining)) = tasks.get_mut(&task_id) else {
        return pending();
    };
    if *remaining > 0 {
        *remaining -= 1;
        return pending();
    }

    let data = json!({
        "task_id": task_id,
        "success": true,
        "message": "done",
        "data": format!("[{action}]"),
    });
    tasks.remove(&task_id);
    state.active.fetch_sub(1, Ordering::SeqCst);
    reply(200, true, "ok", Some(data))
}

/// Proxy to `target` that closes the first `drop_first` connections
///
/// Returns the proxy address and a counter of accepted connections.
pub async fn spawn_flaky_proxy(
    target: SocketAddr,
    drop_first: usize,
) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut inbound, _)) = listener.accept().await else {
                return;
            };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < drop_first {
                drop(inbound);
                continue;
            }
            tokio::spawn(async move {
                if let Ok(mut outbound) = TcpStream::connect(target).await {
                    let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                }
            });
        }
    });

    (addr, accepted)
}

/// An address nothing listens on
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Client settings with short timings for tests
pub fn fast_settings() -> ClientSettings {
    ClientSettings {
        request_timeout: Duration::from_secs(2),
        long_request_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(50),
        task_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        },
        serialize_per_device: true,
    }
}
