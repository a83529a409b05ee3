//! Shared test utilities

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use murmur_gateway::api::{ApiServerBuilder, ApiState};
use murmur_gateway::voice::{Synthesizer, Transcriber, VoiceSettings};
use murmur_gateway::{
    Backend, BackendOutcome, Error, FallbackChain, RequestOrchestrator, ResponseCache, Result,
    SessionStore,
};

/// Backend returning a fixed outcome and counting invocations
pub struct StubBackend {
    name: String,
    outcome: BackendOutcome,
    calls: AtomicUsize,
}

impl StubBackend {
    pub fn answering(name: &str, text: &str) -> Arc<Self> {
        Self::with_outcome(name, BackendOutcome::Success(text.to_string()))
    }

    pub fn over_quota(name: &str) -> Arc<Self> {
        Self::with_outcome(name, BackendOutcome::QuotaExceeded("429 quota".to_string()))
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Self::with_outcome(name, BackendOutcome::Failure("boom".to_string()))
    }

    fn with_outcome(name: &str, outcome: BackendOutcome) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _prompt: &str) -> BackendOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Build a chain over the given stubs, in order
pub fn chain_of(tiers: &[&Arc<StubBackend>]) -> FallbackChain {
    FallbackChain::new(
        tiers
            .iter()
            .map(|t| Arc::clone(*t) as Arc<dyn Backend>)
            .collect(),
    )
}

/// Orchestrator with a fresh one-hour cache over `chain`
pub fn orchestrator(chain: FallbackChain) -> Arc<RequestOrchestrator> {
    Arc::new(RequestOrchestrator::new(ResponseCache::default(), chain))
}

/// Synthesizer producing fake MP3 bytes and recording the settings it saw
#[derive(Default)]
pub struct StubSynthesizer {
    pub seen: std::sync::Mutex<Vec<VoiceSettings>>,
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
    async fn synthesize(&self, text: &str, settings: &VoiceSettings) -> Result<Vec<u8>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(*settings);
        }
        Ok(format!("ID3 {text}").into_bytes())
    }
}

/// Transcriber returning a fixed transcript, or failing when none is set
pub struct StubTranscriber {
    pub transcript: Option<String>,
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, audio: &[u8], _file_name: &str, _locale: &str) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::Stt("empty audio".to_string()));
        }
        self.transcript
            .clone()
            .ok_or_else(|| Error::Stt("could not understand audio".to_string()))
    }
}

/// Build a router answering with `chain`, writing audio under `static_dir`
pub fn build_router(
    chain: FallbackChain,
    static_dir: &Path,
    transcriber: Option<Arc<dyn Transcriber>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
) -> (axum::Router, Arc<ApiState>) {
    build_router_with_idle(
        chain,
        static_dir,
        transcriber,
        synthesizer,
        SessionStore::DEFAULT_IDLE,
    )
}

/// Like [`build_router`], with sessions dropped after `idle`
pub fn build_router_with_idle(
    chain: FallbackChain,
    static_dir: &Path,
    transcriber: Option<Arc<dyn Transcriber>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    idle: Duration,
) -> (axum::Router, Arc<ApiState>) {
    let mut builder = ApiServerBuilder::new(orchestrator(chain), 0)
        .static_dir(static_dir.to_path_buf())
        .session_idle(idle);
    if let Some(transcriber) = transcriber {
        builder = builder.transcriber(transcriber);
    }
    if let Some(synthesizer) = synthesizer {
        builder = builder.synthesizer(synthesizer);
    }

    let server = builder.build();
    (server.router(), server.state())
}
