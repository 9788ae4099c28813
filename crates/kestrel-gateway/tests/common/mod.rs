//! In-process caching server driven by a per-request script.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::Value;

use kestrel_gateway::{CacheClient, Connection, EndpointConfig, ReconnectPolicy, ServerRole};

pub enum Reply {
    Frames(Vec<String>),
    FramesThenDrop(Vec<String>),
    Silent,
}

/// Called once per REQ with `(connection index, verb, params, subscription id)`.
type Responder = Arc<dyn Fn(usize, &str, &Value, &str) -> Reply + Send + Sync>;

#[derive(Clone)]
struct ServerState {
    responder: Responder,
    connections: Arc<AtomicUsize>,
    closes: Arc<Mutex<Vec<String>>>,
}

pub struct FakeServer {
    pub url: String,
    connections: Arc<AtomicUsize>,
    closes: Arc<Mutex<Vec<String>>>,
}

impl FakeServer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(usize, &str, &Value, &str) -> Reply + Send + Sync + 'static,
    {
        let state = ServerState {
            responder: Arc::new(responder),
            connections: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(Mutex::new(Vec::new())),
        };
        let connections = state.connections.clone();
        let closes = state.closes.clone();

        let app = Router::new()
            .route("/v1", get(upgrade))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("ws://{}/v1", addr),
            connections,
            closes,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn closed_ids(&self) -> Vec<String> {
        self.closes.lock().unwrap().clone()
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ServerState) {
    let index = state.connections.fetch_add(1, Ordering::SeqCst);

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        let id = frame[1].as_str().unwrap_or_default().to_string();

        match frame[0].as_str() {
            Some("REQ") => {
                let verb = frame[2]["cache"][0].as_str().unwrap_or_default().to_string();
                let params = frame[2]["cache"][1].clone();
                let (frames, drop_after) = match (state.responder)(index, &verb, &params, &id) {
                    Reply::Frames(frames) => (frames, false),
                    Reply::FramesThenDrop(frames) => (frames, true),
                    Reply::Silent => (Vec::new(), false),
                };
                for frame in frames {
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                if drop_after {
                    return;
                }
            }
            Some("CLOSE") => state.closes.lock().unwrap().push(id),
            _ => {}
        }
    }
}

pub fn event(id: &str, event: Value) -> String {
    serde_json::json!(["EVENT", id, event]).to_string()
}

pub fn eose(id: &str) -> String {
    serde_json::json!(["EOSE", id]).to_string()
}

pub fn notice(id: &str, message: &str) -> String {
    serde_json::json!(["NOTICE", id, message]).to_string()
}

pub fn note(id: &str, created_at: u64) -> Value {
    serde_json::json!({
        "id": id,
        "pubkey": "author",
        "created_at": created_at,
        "kind": 1,
        "tags": [],
        "content": format!("note {}", id),
        "sig": "sig",
    })
}

pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        heartbeat_interval: Duration::from_secs(15),
    }
}

pub fn client_for(url: &str) -> (Arc<EndpointConfig>, CacheClient) {
    let endpoints = Arc::new(EndpointConfig::new(url, url, url));
    let connection = Connection::new(ServerRole::Caching, endpoints.clone(), fast_policy());
    (endpoints, CacheClient::new(Arc::new(connection)))
}

/// Poll `condition` every 10ms for up to five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
