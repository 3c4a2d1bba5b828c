use async_trait::async_trait;
use bytes::Bytes;
use narrator_provider::{
    ProviderError, ProviderResult, SpeechProvider, Synthesis, SynthesisRequest,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

#[allow(dead_code)]
pub fn audio(len: usize) -> Synthesis {
    Synthesis {
        audio: Bytes::from(vec![0xAB; len]),
        duration_seconds: len as f64 / 16_384.0,
    }
}

/// Provider that replays a fixed list of outcomes, then succeeds.
#[allow(dead_code)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ProviderResult<Synthesis>>>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new(script: Vec<ProviderResult<Synthesis>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn failing(err: ProviderError, times: usize) -> Arc<Self> {
        Self::new((0..times).map(|_| Err(err.clone())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechProvider for ScriptedProvider {
    async fn generate(&self, _request: &SynthesisRequest) -> ProviderResult<Synthesis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(audio(1024)))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// Provider whose calls block until the test releases them, one permit per call.
#[allow(dead_code)]
pub struct GatedProvider {
    gate: Semaphore,
    started: Mutex<Vec<String>>,
    finished: AtomicUsize,
}

#[allow(dead_code)]
impl GatedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            started: Mutex::new(Vec::new()),
            finished: AtomicUsize::new(0),
        })
    }

    /// Let `n` blocked or future calls return audio.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Texts of every call made so far, in call order.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn started_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechProvider for GatedProvider {
    async fn generate(&self, request: &SynthesisRequest) -> ProviderResult<Synthesis> {
        self.started.lock().unwrap().push(request.text.clone());
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ProviderError::ProviderUnavailable("gate closed".into()))?;
        permit.forget();
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(audio(2048))
    }

    fn provider_name(&self) -> &'static str {
        "gated"
    }
}

/// Provider that takes `delay` to answer.
#[allow(dead_code)]
pub struct SlowProvider {
    pub delay: Duration,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl SlowProvider {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechProvider for SlowProvider {
    async fn generate(&self, _request: &SynthesisRequest) -> ProviderResult<Synthesis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(audio(512))
    }

    fn provider_name(&self) -> &'static str {
        "slow"
    }
}
