//! In-process HTTP backend for integration tests.
//!
//! Every request lands in one fallback handler that records it and answers
//! from a per-path reply queue. The last reply of a queue is sticky, so a
//! single `MockReply::Status(503)` answers every attempt of a retry loop.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Canned response for one request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Json { status: u16, body: Value },
    Status(u16),
    /// Streamed body, one chunk per write, `delay` before each chunk.
    Ndjson { chunks: Vec<Vec<u8>>, delay: Duration },
    Bytes { content_type: String, body: Vec<u8> },
    Delayed { delay: Duration, reply: Box<MockReply> },
}

impl MockReply {
    /// `200 {code: 0, msg: "", data}`
    pub fn ok(data: Value) -> Self {
        MockReply::Json {
            status: 200,
            body: json!({"code": 0, "msg": "", "data": data}),
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        MockReply::Json { status, body }
    }

    pub fn ndjson(chunks: Vec<Vec<u8>>) -> Self {
        MockReply::Ndjson {
            chunks,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(delay: Duration, reply: MockReply) -> Self {
        MockReply::Delayed {
            delay,
            reply: Box::new(reply),
        }
    }
}

/// What the backend saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn body_json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct Inner {
    routes: HashMap<String, VecDeque<MockReply>>,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<Inner>>;

/// Running mock server bound to an ephemeral localhost port.
pub struct MockBackend {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue replies for `path`; the last one repeats.
    pub fn route(&self, path: &str, replies: impl IntoIterator<Item = MockReply>) {
        let mut inner = self.state.lock().expect("mock state");
        inner
            .routes
            .entry(path.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().expect("mock state").requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(State(state): State<Shared>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap_or_default();
    let path = parts.uri.path().to_string();

    let reply = {
        let mut inner = state.lock().expect("mock state");
        inner.requests.push(RecordedRequest {
            method: parts.method.to_string(),
            path: path.clone(),
            query: parts.uri.query().map(str::to_string),
            headers: header_map(&parts.headers),
            body: body.to_vec(),
        });
        match inner.routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };

    match reply {
        Some(reply) => render(reply).await,
        None => (StatusCode::NOT_FOUND, axum::Json(json!({"detail": "Not Found"}))).into_response(),
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

async fn render(mut reply: MockReply) -> Response {
    while let MockReply::Delayed { delay, reply: inner } = reply {
        tokio::time::sleep(delay).await;
        reply = *inner;
    }
    match reply {
        MockReply::Json { status, body } => (status_code(status), axum::Json(body)).into_response(),
        MockReply::Status(status) => status_code(status).into_response(),
        MockReply::Ndjson { chunks, delay } => {
            let chunks = chunks.into_iter().filter(|chunk| !chunk.is_empty());
            let stream = futures_util::stream::iter(chunks).then(move |chunk| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, Infallible>(Bytes::from(chunk))
            });
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/x-ndjson")
                .body(Body::from_stream(stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        MockReply::Bytes { content_type, body } => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        MockReply::Delayed { .. } => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
