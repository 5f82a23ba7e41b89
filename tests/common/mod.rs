#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use prompt_wizard::model::{CompletionBackend, CompletionRequest, UpstreamError};
use prompt_wizard::rate_limit::RateLimitConfig;
use prompt_wizard::{app, build_state_with_backends, AppConfig, AppState};
use serde_json::Value;
use tower::ServiceExt; // for oneshot

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn set_many(&mut self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// What a [`StubBackend`] answers with on every call.
#[derive(Clone)]
pub enum StubReply {
    Text(String),
    Status(u16, String),
    MissingCredential,
}

/// In-process completion backend that records every request.
pub struct StubBackend {
    reply: StubReply,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubBackend {
    pub fn new(reply: StubReply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn text(reply: impl Into<String>) -> Arc<Self> {
        Self::new(StubReply::Text(reply.into()))
    }

    pub fn json(reply: Value) -> Arc<Self> {
        Self::text(reply.to_string())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl CompletionBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        match &self.reply {
            StubReply::Text(text) => Ok(text.clone()),
            StubReply::Status(status, body) => Err(UpstreamError::Status {
                status: *status,
                body: body.clone(),
            }),
            StubReply::MissingCredential => Err(UpstreamError::MissingCredential),
        }
    }
}

/// Default configuration with identities taken from `X-Forwarded-For`, so
/// router-level tests can pick the client they impersonate.
pub fn test_config() -> AppConfig {
    AppConfig {
        trust_proxy: true,
        ..AppConfig::default()
    }
}

pub fn config_with_limit(max_requests: u32, window: Duration) -> AppConfig {
    AppConfig {
        rate_limit: RateLimitConfig {
            window,
            max_requests,
        },
        ..test_config()
    }
}

pub fn stub_app(
    config: &AppConfig,
    text: Arc<StubBackend>,
    image: Arc<StubBackend>,
) -> (Router, AppState) {
    let state = build_state_with_backends(config, text, image).unwrap();
    (app(state.clone()), state)
}

pub fn json_request(uri: &str, client: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, headers, json)
}

pub async fn post_json(app: &Router, uri: &str, client: &str, body: Value) -> (StatusCode, HeaderMap, Value) {
    send(app, json_request(uri, client, &body)).await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

/// Well-formed optimize reply from the model.
pub fn optimize_reply(text: &str) -> Value {
    serde_json::json!({
        "text": text,
        "structure": {
            "context": "Blog post for developers",
            "task": "Explain ownership",
            "format": "Markdown",
            "examples": "None"
        },
        "improvements": ["Added audience", "Clarified format"]
    })
}
