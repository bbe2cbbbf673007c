//! Shared fixtures: a mock ComfyUI server and handler builders.
//!
//! The mock serves the HTTP routes the worker uses plus the `/ws`
//! session endpoint. When a prompt is queued it pushes a scripted event
//! sequence to the submitting client's WebSocket session.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use ltx_comfyui::{ComfyUIApi, ComfyUIClient, ComfyUIEndpoint, ReadinessConfig, RetryConfig};
use ltx_core::workflow::WorkflowTemplate;
use ltx_worker::handler::JobHandler;

/// How the mock reacts to a queued prompt.
#[derive(Clone)]
pub struct MockBehavior {
    /// `None` accepts the prompt; `Some((status, body))` rejects it.
    pub reject: Option<(StatusCode, String)>,
    /// History `status` block.
    pub status: Value,
    /// History `outputs` map.
    pub outputs: Value,
    /// Bytes served from `/view`.
    pub video: Vec<u8>,
    /// What follows the progress events on the WebSocket.
    pub ending: Ending,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// `executing` with a null node for the queued prompt.
    Complete,
    /// A close frame instead of completion.
    Close,
    /// Nothing; the session stays open and silent.
    Hang,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            reject: None,
            status: json!({"status_str": "success", "completed": true, "messages": []}),
            outputs: json!({
                "75": {
                    "images": [{"filename": "ltx_00001_.mp4", "subfolder": "video", "type": "output"}],
                    "animated": [true]
                }
            }),
            video: sample_video(4096),
            ending: Ending::Complete,
        }
    }
}

/// Deterministic fake video payload.
pub fn sample_video(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Default)]
pub struct Recorded {
    /// Every HTTP or WebSocket request that reached the mock.
    pub requests: AtomicUsize,
    /// Bodies posted to `/prompt`.
    pub submissions: Mutex<Vec<Value>>,
    /// Client ids that opened a WebSocket session.
    pub sessions: Mutex<Vec<String>>,
    /// Query strings sent to `/view`.
    pub views: Mutex<Vec<HashMap<String, String>>>,
    /// Prompt ids deleted via `/queue`.
    pub dequeued: Mutex<Vec<Value>>,
    pub interrupts: AtomicUsize,
    /// Close frames received from clients.
    pub closes: AtomicUsize,
}

impl Recorded {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Wait up to two seconds for `expected` close frames to arrive, then
    /// give stragglers a moment and return the final count.
    pub async fn closes_after(&self, expected: usize) -> usize {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.closes.load(Ordering::SeqCst) < expected
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.closes.load(Ordering::SeqCst)
    }
}

struct MockState {
    behavior: MockBehavior,
    recorded: Arc<Recorded>,
    sessions: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
    next_prompt: AtomicUsize,
}

/// A running mock ComfyUI.
pub struct MockComfy {
    pub endpoint: ComfyUIEndpoint,
    pub recorded: Arc<Recorded>,
}

pub async fn spawn_mock(behavior: MockBehavior) -> MockComfy {
    let recorded = Arc::new(Recorded::default());
    let state = Arc::new(MockState {
        behavior,
        recorded: Arc::clone(&recorded),
        sessions: Mutex::new(HashMap::new()),
        next_prompt: AtomicUsize::new(1),
    });

    let app = Router::new()
        .route("/system_stats", get(system_stats))
        .route("/prompt", post(queue_prompt))
        .route("/history/{prompt_id}", get(history))
        .route("/view", get(view))
        .route("/queue", post(dequeue))
        .route("/interrupt", post(interrupt))
        .route("/ws", get(ws_upgrade))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockComfy {
        endpoint: ComfyUIEndpoint::from_host("127.0.0.1", port),
        recorded,
    }
}

/// Endpoint with nothing listening on it.
pub fn dead_endpoint() -> ComfyUIEndpoint {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    ComfyUIEndpoint::from_host("127.0.0.1", port)
}

/// Minimal workflow containing every node the injector writes to.
pub fn test_template() -> WorkflowTemplate {
    WorkflowTemplate::from_value(json!({
        "92:3": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}},
        "92:11": {"class_type": "RandomNoise", "inputs": {"noise_seed": 0}},
        "92:67": {"class_type": "RandomNoise", "inputs": {"noise_seed": 0}},
        "92:89": {"class_type": "EmptyImage", "inputs": {"width": 0, "height": 0}},
        "92:43": {"class_type": "EmptyLTXVLatentVideo", "inputs": {"length": 0}},
        "92:51": {"class_type": "LTXVConditioning", "inputs": {"frames_number": 0}},
        "75": {"class_type": "SaveVideo", "inputs": {"filename_prefix": "video/ltx"}}
    }))
    .unwrap()
}

/// Handler wired to `endpoint` with short retry schedules.
pub fn test_handler(endpoint: &ComfyUIEndpoint) -> JobHandler {
    test_handler_with_readiness(
        endpoint,
        ReadinessConfig {
            max_attempts: 3,
            interval: Duration::from_millis(10),
            progress_every: 30,
        },
    )
}

/// Handler with a caller-chosen readiness schedule.
pub fn test_handler_with_readiness(
    endpoint: &ComfyUIEndpoint,
    readiness: ReadinessConfig,
) -> JobHandler {
    JobHandler::from_parts(
        ComfyUIApi::new(endpoint),
        ComfyUIClient::new(endpoint).with_connect_timeout(Duration::from_secs(5)),
        test_template(),
        readiness,
        RetryConfig::fixed(3, Duration::from_millis(10)),
    )
}

// ---------------------------------------------------------------------------
// Mock routes
// ---------------------------------------------------------------------------

type Shared = State<Arc<MockState>>;

async fn system_stats(State(state): Shared) -> Json<Value> {
    state.recorded.requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({"system": {"comfyui_version": "0.3.60"}, "devices": []}))
}

async fn queue_prompt(State(state): Shared, Json(body): Json<Value>) -> Response {
    state.recorded.requests.fetch_add(1, Ordering::SeqCst);
    state.recorded.submissions.lock().unwrap().push(body.clone());

    if let Some((status, text)) = &state.behavior.reject {
        return (*status, text.clone()).into_response();
    }

    let n = state.next_prompt.fetch_add(1, Ordering::SeqCst);
    let prompt_id = format!("prompt-{n}");
    let client_id = body["client_id"].as_str().unwrap_or_default().to_string();

    let sender = state.sessions.lock().unwrap().get(&client_id).cloned();
    if let Some(tx) = sender {
        for msg in event_script(&prompt_id, state.behavior.ending) {
            let _ = tx.send(msg);
        }
    }

    Json(json!({"prompt_id": prompt_id, "number": n, "node_errors": {}})).into_response()
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string().into())
}

/// Realistic noise around the terminal event.
fn event_script(prompt_id: &str, ending: Ending) -> Vec<Message> {
    let mut script = vec![
        text(json!({"type": "status", "data": {"status": {"exec_info": {"queue_remaining": 1}}}})),
        text(json!({"type": "execution_start", "data": {"prompt_id": prompt_id}})),
        text(json!({"type": "executing", "data": {"node": "92:3", "prompt_id": prompt_id}})),
        Message::Binary(vec![0u8, 0, 0, 1, 0xFF, 0xD8].into()),
        text(json!({"type": "progress", "data": {"value": 4, "max": 8, "prompt_id": prompt_id, "node": "92:11"}})),
        text(json!({"type": "crystools.monitor", "data": {"cpu_utilization": 12}})),
        Message::Text("{not json".to_string().into()),
        text(json!({"type": "executing", "data": {"node": null, "prompt_id": "someone-else"}})),
    ];

    match ending {
        Ending::Complete => script.push(text(
            json!({"type": "executing", "data": {"node": null, "prompt_id": prompt_id}}),
        )),
        Ending::Close => script.push(Message::Close(None)),
        Ending::Hang => {}
    }

    script
}

async fn history(State(state): Shared, Path(prompt_id): Path<String>) -> Json<Value> {
    state.recorded.requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        prompt_id: {
            "prompt": [],
            "outputs": state.behavior.outputs,
            "status": state.behavior.status,
        }
    }))
}

async fn view(State(state): Shared, Query(query): Query<HashMap<String, String>>) -> Vec<u8> {
    state.recorded.requests.fetch_add(1, Ordering::SeqCst);
    state.recorded.views.lock().unwrap().push(query);
    state.behavior.video.clone()
}

async fn dequeue(State(state): Shared, Json(body): Json<Value>) -> StatusCode {
    state.recorded.requests.fetch_add(1, Ordering::SeqCst);
    state.recorded.dequeued.lock().unwrap().push(body);
    StatusCode::OK
}

async fn interrupt(State(state): Shared) -> StatusCode {
    state.recorded.requests.fetch_add(1, Ordering::SeqCst);
    state.recorded.interrupts.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn ws_upgrade(
    State(state): Shared,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    state.recorded.requests.fetch_add(1, Ordering::SeqCst);
    let client_id = query.get("clientId").cloned().unwrap_or_default();
    state.recorded.sessions.lock().unwrap().push(client_id.clone());

    // Register before the upgrade completes so a prompt queued right after
    // the handshake still finds the session.
    let (tx, rx) = mpsc::unbounded_channel();
    state.sessions.lock().unwrap().insert(client_id, tx);

    let recorded = Arc::clone(&state.recorded);
    ws.on_upgrade(move |socket| pump(socket, rx, recorded))
}

async fn pump(
    mut socket: WebSocket,
    mut rx: mpsc::UnboundedReceiver<Message>,
    recorded: Arc<Recorded>,
) {
    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(msg) => {
                    if socket.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) => {
                    recorded.closes.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
