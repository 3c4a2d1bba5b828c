//! Test providers and request helpers.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use narrator_provider::{
    ProviderError, ProviderHealth, ProviderResult, SpeechProvider, Synthesis, SynthesisRequest,
};
use narrator_server::HealthSource;
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::ServiceExt;

/// Bytes every fixture provider answers with.
#[allow(dead_code)]
pub const AUDIO: &[u8] = b"ID3\x04fake-mp3-frames";

/// Provider that answers with [`AUDIO`], or fails with `error` while one is set.
///
/// Calls block until [`FixtureProvider::release`] when constructed gated.
#[allow(dead_code)]
pub struct FixtureProvider {
    error: Mutex<Option<ProviderError>>,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl FixtureProvider {
    pub fn succeeding() -> Self {
        Self {
            error: Mutex::new(None),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            error: Mutex::new(Some(error)),
            ..Self::succeeding()
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::succeeding()
        }
    }

    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechProvider for FixtureProvider {
    async fn generate(&self, _request: &SynthesisRequest) -> ProviderResult<Synthesis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| ProviderError::ProviderUnavailable("gate closed".into()))?
                .forget();
        }
        if let Some(error) = self.error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(Synthesis {
            audio: Bytes::from_static(AUDIO),
            duration_seconds: 0.5,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fixture"
    }
}

/// Fixed provider health for admin endpoint tests.
#[allow(dead_code)]
pub struct StaticHealth(pub ProviderHealth);

impl HealthSource for StaticHealth {
    fn health(&self) -> ProviderHealth {
        self.0.clone()
    }
}

/// Send a request through the router, returning status and parsed JSON body.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Poll a request's status until `done` holds for its JSON, or panic after 5s.
#[allow(dead_code)]
pub async fn poll_status(
    router: &axum::Router,
    request_id: &str,
    done: impl Fn(&Value) -> bool,
) -> Value {
    let uri = format!("/v1/narration/status/{request_id}");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (status, body) = json_request(router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK, "status poll failed: {body}");
        if done(&body) {
            return body;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("request {request_id} never reached the expected state: {body}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
