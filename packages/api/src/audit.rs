//! Request audit log.
//!
//! [`audit_middleware`] captures each request/response pair, masks credentials
//! and hands the resulting [`AuditEntry`] to an [`AuditSink`]. The sink is a
//! bounded queue drained by one background task into an [`AuditStore`]; when
//! the queue is full the oldest pending entry is dropped, so request handling
//! never waits on audit persistence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, COOKIE};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use store::{AuditEntry, AuditStore};

use crate::auth::session::extract_principal;
use crate::error::ApiError;
use crate::state::AppState;

/// Bodies longer than this many bytes are cut before they are stored.
pub const MAX_BODY_LEN: usize = 10_000;
/// Largest request body accepted by any route, matching axum's default extractor limit.
pub const MAX_REQUEST_BYTES: usize = 2 * 1024 * 1024;
const TRUNCATED_MARKER: &str = "... [TRUNCATED]";
const MASK: &str = "***MASKED***";
/// Characters of the `Authorization` header kept in clear.
const AUTHORIZATION_PREFIX: usize = 10;

struct Queue {
    entries: VecDeque<AuditEntry>,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl Shared {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(Queue {
                entries: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue, evicting the oldest entry when full. Returns false once closed.
    fn push(&self, entry: AuditEntry) -> bool {
        {
            let mut queue = self.lock();
            if queue.closed {
                return false;
            }
            if queue.entries.len() >= self.capacity {
                queue.entries.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.entries.push_back(entry);
        }
        self.ready.notify_one();
        true
    }

    /// Next entry to persist; `None` means the queue is closed and empty.
    async fn pop(&self) -> Option<AuditEntry> {
        loop {
            {
                let mut queue = self.lock();
                if let Some(entry) = queue.entries.pop_front() {
                    return Some(entry);
                }
                if queue.closed {
                    return None;
                }
            }
            self.ready.notified().await;
        }
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }
}

/// Handle to the audit queue. Clones share the same queue and worker.
#[derive(Clone)]
pub struct AuditSink {
    shared: Arc<Shared>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AuditSink {
    /// Start the background writer. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn AuditStore>, capacity: usize) -> Self {
        let shared = Arc::new(Shared::new(capacity));
        let worker = tokio::spawn(run_worker(shared.clone(), store));
        Self {
            shared,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Queue an entry for persistence. Never blocks.
    pub fn submit(&self, entry: AuditEntry) {
        if !self.shared.push(entry) {
            tracing::debug!("audit sink closed, entry discarded");
        }
    }

    /// Number of entries evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting entries and wait until the pending ones are written.
    pub async fn shutdown(&self) {
        self.shared.close();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "audit worker panicked");
            }
        }
        let dropped = self.dropped();
        if dropped > 0 {
            tracing::warn!(dropped, "audit entries dropped while the queue was full");
        }
    }
}

async fn run_worker(shared: Arc<Shared>, store: Arc<dyn AuditStore>) {
    while let Some(entry) = shared.pop().await {
        if let Err(e) = store.save_audit(&entry).await {
            tracing::warn!(
                error = %e,
                endpoint = %entry.endpoint,
                "failed to save audit entry"
            );
        }
    }
    tracing::debug!("audit worker stopped");
}

/// Middleware recording every request into the state's [`AuditSink`].
///
/// Install with `axum::middleware::from_fn_with_state`.
pub async fn audit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let datetime = Utc::now();

    let (parts, body) = request.into_parts();
    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > MAX_REQUEST_BYTES as u64) {
        tracing::debug!(content_length = ?declared, "request body over limit");
        return ApiError::PayloadTooLarge.into_response();
    }
    // Chunked or under-declared bodies are cut off by the read limit.
    let request_body = match to_bytes(body, MAX_REQUEST_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            return ApiError::PayloadTooLarge.into_response();
        }
    };

    let method = parts.method.to_string();
    let endpoint = parts.uri.path().to_string();
    let request_headers = mask_headers(&parts.headers);
    let user_id = extract_principal(&parts.headers, &state.tokens)
        .ok()
        .map(|p| p.user_id);
    let request_payload = mask_passwords(&String::from_utf8_lossy(&request_body));

    let response = next
        .run(Request::from_parts(parts, Body::from(request_body)))
        .await;

    let (parts, body) = response.into_parts();
    let response_body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to buffer response body");
            return ApiError::Internal.into_response();
        }
    };

    let elapsed = started.elapsed();
    let status = parts.status.as_u16();
    tracing::info!(
        method = %method,
        path = %endpoint,
        status,
        duration_ms = elapsed.as_millis() as u64,
        "request handled"
    );

    if let Some(sink) = &state.audit {
        sink.submit(AuditEntry {
            datetime,
            method,
            endpoint,
            request_headers,
            request_payload: truncate(request_payload),
            response_body: truncate(String::from_utf8_lossy(&response_body).into_owned()),
            response_status: i32::from(status),
            duration_ms: i32::try_from(elapsed.as_millis()).unwrap_or(i32::MAX),
            user_id,
        });
    }

    Response::from_parts(parts, Body::from(response_body))
}

/// Headers as a JSON object with credentials masked. Repeated headers are joined with `", "`.
pub fn mask_headers(headers: &HeaderMap) -> String {
    let mut out = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        let value = if name == AUTHORIZATION {
            if joined.chars().count() > AUTHORIZATION_PREFIX {
                let prefix: String = joined.chars().take(AUTHORIZATION_PREFIX).collect();
                format!("{prefix}{MASK}")
            } else {
                MASK.to_string()
            }
        } else if name == COOKIE {
            MASK.to_string()
        } else {
            joined
        };
        out.insert(name.as_str().to_string(), Value::String(value));
    }
    Value::Object(out).to_string()
}

/// Replace every `password` field of a JSON payload. Non-JSON payloads pass through.
pub fn mask_passwords(payload: &str) -> String {
    let Ok(mut value) = serde_json::from_str::<Value>(payload) else {
        return payload.to_string();
    };
    mask_value(&mut value);
    value.to_string()
}

fn mask_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if key == "password" {
                    *field = Value::String(MASK.to_string());
                } else {
                    mask_value(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_value),
        _ => {}
    }
}

/// Cut `text` to at most [`MAX_BODY_LEN`] bytes on a char boundary, marking the cut.
pub fn truncate(mut text: String) -> String {
    if text.len() <= MAX_BODY_LEN {
        return text;
    }
    let mut end = MAX_BODY_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str(TRUNCATED_MARKER);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use store::{MemoryStore, StoreError, StoreResult};

    fn entry(endpoint: &str) -> AuditEntry {
        AuditEntry {
            datetime: Utc::now(),
            method: "GET".into(),
            endpoint: endpoint.into(),
            request_headers: "{}".into(),
            request_payload: String::new(),
            response_body: String::new(),
            response_status: 200,
            duration_ms: 1,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn full_queue_drops_oldest() {
        let shared = Shared::new(2);
        assert!(shared.push(entry("/a")));
        assert!(shared.push(entry("/b")));
        assert!(shared.push(entry("/c")));
        assert_eq!(shared.dropped.load(Ordering::Relaxed), 1);

        shared.close();
        assert!(!shared.push(entry("/d")));
        assert_eq!(shared.pop().await.unwrap().endpoint, "/b");
        assert_eq!(shared.pop().await.unwrap().endpoint, "/c");
        assert!(shared.pop().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_drains_pending_entries() {
        let store = MemoryStore::new();
        let sink = AuditSink::spawn(Arc::new(store.clone()), 16);
        for path in ["/one", "/two", "/three"] {
            sink.submit(entry(path));
        }
        sink.shutdown().await;

        let endpoints: Vec<_> = store
            .audit_entries()
            .await
            .into_iter()
            .map(|e| e.endpoint)
            .collect();
        assert_eq!(endpoints, vec!["/one", "/two", "/three"]);
        assert_eq!(sink.dropped(), 0);
    }

    struct FailingStore;

    #[async_trait]
    impl AuditStore for FailingStore {
        async fn save_audit(&self, _entry: &AuditEntry) -> StoreResult<()> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn failed_writes_are_discarded() {
        let sink = AuditSink::spawn(Arc::new(FailingStore), 4);
        sink.submit(entry("/x"));
        sink.submit(entry("/y"));
        sink.shutdown().await;
        sink.submit(entry("/after"));
    }

    #[test]
    fn credentials_are_masked_in_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abcdefghijklmnop"));
        headers.insert(COOKIE, HeaderValue::from_static("token=secret"));
        headers.insert("x-request-id", HeaderValue::from_static("42"));

        let masked: Value = serde_json::from_str(&mask_headers(&headers)).unwrap();
        assert_eq!(masked["authorization"], "Bearer abc***MASKED***");
        assert_eq!(masked["cookie"], MASK);
        assert_eq!(masked["x-request-id"], "42");

        let mut short = HeaderMap::new();
        short.insert(AUTHORIZATION, HeaderValue::from_static("Basic x"));
        let masked: Value = serde_json::from_str(&mask_headers(&short)).unwrap();
        assert_eq!(masked["authorization"], MASK);
    }

    #[test]
    fn password_fields_are_masked() {
        let masked: Value =
            serde_json::from_str(&mask_passwords(r#"{"username":"alice","password":"hunter2"}"#))
                .unwrap();
        assert_eq!(masked["username"], "alice");
        assert_eq!(masked["password"], MASK);

        let nested = mask_passwords(r#"[{"user":{"password":"p"}}]"#);
        assert!(!nested.contains("\"p\""));

        assert_eq!(mask_passwords("not json"), "not json");
        assert_eq!(mask_passwords(""), "");
    }

    #[test]
    fn long_bodies_are_truncated() {
        assert_eq!(truncate("short".into()), "short");

        let long = "x".repeat(MAX_BODY_LEN + 5);
        let cut = truncate(long);
        assert_eq!(cut.len(), MAX_BODY_LEN + TRUNCATED_MARKER.len());
        assert!(cut.ends_with(TRUNCATED_MARKER));

        // Multi-byte char straddling the limit is not split.
        let mut text = "a".repeat(MAX_BODY_LEN - 1);
        text.push('é');
        text.push_str("tail");
        let cut = truncate(text);
        assert!(cut.starts_with(&"a".repeat(MAX_BODY_LEN - 1)));
        assert!(cut.ends_with(TRUNCATED_MARKER));
    }
}
