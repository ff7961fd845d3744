//! In-process stand-in for the etcd v2 keys API.
//!
//! Serves reads, form-encoded writes, and long-poll watches against an
//! in-memory node table. Watch requests can be scripted to stall past the
//! client's timeout or to fail, which is how the reconnect behaviour is
//! exercised.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

/// One request observed by the fake server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    /// Key path below `/v2/keys/`, without a leading slash.
    pub path: String,
    /// True for long-poll requests (`wait=true`).
    pub wait: bool,
    pub wait_index: Option<u64>,
}

/// Scripted behaviour for the next watch request.
#[derive(Debug, Clone)]
pub enum WatchStep {
    /// Hold the request open for the given duration without answering.
    Stall(Duration),
    /// Answer with an etcd-style error body.
    Fail(StatusCode, &'static str),
}

#[derive(Debug, Clone)]
struct Node {
    value: Option<String>,
    modified_index: u64,
}

/// Shared backend state storing nodes, scripted steps, and collected requests.
#[derive(Default)]
struct EtcdState {
    nodes: HashMap<String, Node>,
    /// Highest index handed out so far.
    index: u64,
    watch_script: VecDeque<WatchStep>,
    request_log: Vec<RecordedRequest>,
}

#[derive(Clone)]
struct Shared {
    state: Arc<Mutex<EtcdState>>,
    /// Publishes the latest index whenever a node changes.
    changes: Arc<watch::Sender<u64>>,
}

impl Shared {
    async fn record(&self, request: RecordedRequest) {
        self.state.lock().await.request_log.push(request);
    }

    async fn node(&self, path: &str) -> Option<Node> {
        self.state.lock().await.nodes.get(path).cloned()
    }

    async fn store(&self, path: &str, value: Option<String>, index: Option<u64>) -> (Node, bool) {
        let (node, created) = {
            let mut guard = self.state.lock().await;
            let index = index.unwrap_or(guard.index + 1);
            guard.index = guard.index.max(index);
            let node = Node {
                value,
                modified_index: index,
            };
            let previous = guard.nodes.insert(path.to_string(), node.clone());
            let created = previous.map_or(true, |node| node.value.is_none());
            (node, created)
        };
        self.changes.send_replace(node.modified_index);
        (node, created)
    }
}

/// Fake etcd server bound to an ephemeral local port.
pub struct FakeEtcd {
    endpoint: String,
    shared: Shared,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FakeEtcd {
    /// Spawns the server and returns a handle for scripting scenarios.
    pub async fn start() -> Self {
        let (changes, _) = watch::channel(0);
        let shared = Shared {
            state: Arc::new(Mutex::new(EtcdState::default())),
            changes: Arc::new(changes),
        };
        let router = Router::new()
            .route("/v2/keys/{*path}", get(handle_get).put(handle_put))
            .with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("fake etcd bind");
        let addr = listener.local_addr().expect("fake etcd address");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("fake etcd run");
        });

        Self {
            endpoint: format!("http://{addr}"),
            shared,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stores `value` at `path` with an explicit modified index.
    pub async fn set(&self, path: &str, value: &str, index: u64) {
        self.shared
            .store(path, Some(value.to_string()), Some(index))
            .await;
    }

    /// Deletes `path`, producing a delete event for watchers.
    pub async fn delete(&self, path: &str) {
        self.shared.store(path, None, None).await;
    }

    /// Queues behaviour for upcoming watch requests, in order.
    pub async fn script_watch(&self, steps: impl IntoIterator<Item = WatchStep>) {
        self.shared.state.lock().await.watch_script.extend(steps);
    }

    /// Returns all requests observed so far.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.state.lock().await.request_log.clone()
    }

    /// Waits until a request matching `predicate` has been observed.
    pub async fn wait_for_request<F>(&self, predicate: F) -> RecordedRequest
    where
        F: Fn(&RecordedRequest) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(found) = self.requests().await.into_iter().find(|r| predicate(r)) {
                return found;
            }
            assert!(Instant::now() < deadline, "expected request never arrived");
            sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for FakeEtcd {
    /// Tears down the listener when the fake goes out of scope.
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn node_body(action: &str, path: &str, node: &Node) -> Response {
    Json(json!({
        "action": action,
        "node": {
            "key": format!("/{path}"),
            "value": node.value,
            "modifiedIndex": node.modified_index,
            "createdIndex": node.modified_index,
        }
    }))
    .into_response()
}

fn error_body(status: StatusCode, code: u32, message: &str, cause: &str) -> Response {
    (
        status,
        Json(json!({"errorCode": code, "message": message, "cause": cause})),
    )
        .into_response()
}

/// Serves plain reads and long-poll watches.
async fn handle_get(
    State(shared): State<Shared>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let wait = query.get("wait").is_some_and(|value| value == "true");
    let wait_index = query.get("waitIndex").and_then(|value| value.parse().ok());
    shared
        .record(RecordedRequest {
            method: "GET",
            path: path.clone(),
            wait,
            wait_index,
        })
        .await;

    if !wait {
        return match shared.node(&path).await {
            Some(node) if node.value.is_some() => node_body("get", &path, &node),
            _ => error_body(StatusCode::NOT_FOUND, 100, "Key not found", &format!("/{path}")),
        };
    }

    let step = shared.state.lock().await.watch_script.pop_front();
    match step {
        Some(WatchStep::Stall(duration)) => {
            sleep(duration).await;
            return StatusCode::GATEWAY_TIMEOUT.into_response();
        }
        Some(WatchStep::Fail(status, message)) => {
            return error_body(status, 401, message, "scripted failure");
        }
        None => {}
    }

    let mut changes = shared.changes.subscribe();
    let threshold = match wait_index {
        Some(index) => index,
        None => shared.state.lock().await.index + 1,
    };
    loop {
        if let Some(node) = shared.node(&path).await {
            if node.modified_index >= threshold {
                let action = if node.value.is_some() { "set" } else { "delete" };
                return node_body(action, &path, &node);
            }
        }
        if changes.changed().await.is_err() {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }
}

/// Serves form-encoded writes.
async fn handle_put(
    State(shared): State<Shared>,
    Path(path): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    shared
        .record(RecordedRequest {
            method: "PUT",
            path: path.clone(),
            wait: false,
            wait_index: None,
        })
        .await;
    let Some(value) = form.get("value").cloned() else {
        return error_body(
            StatusCode::BAD_REQUEST,
            200,
            "Value is Required in POST form",
            "missing value",
        );
    };
    let (node, created) = shared.store(&path, Some(value), None).await;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, node_body("set", &path, &node)).into_response()
}
