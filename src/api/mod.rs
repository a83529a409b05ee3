//! HTTP API server for the murmur assistant

pub mod assistant;
mod error;
pub mod health;
mod session;
pub mod voice;

pub use error::ApiError;
pub use session::{SESSION_COOKIE, Session};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::cache::ResponseCache;
use crate::config::{Config, DEFAULT_STT_LOCALE};
use crate::history::SessionStore;
use crate::orchestrator::RequestOrchestrator;
use crate::voice::{SharedVoiceSettings, Synthesizer, Transcriber, VoiceSettings};
use crate::{Error, Result};

/// Directory under the static root holding synthesized replies
pub const AUDIO_DIR: &str = "audio";

/// Shared state for API handlers
pub struct ApiState {
    /// Cache plus backend chain, shared by every session
    pub orchestrator: Arc<RequestOrchestrator>,
    /// Per-session chat histories; owns the files under `audio/`
    pub sessions: SessionStore,
    /// Process-wide voice settings
    pub voice_settings: SharedVoiceSettings,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub synthesizer: Option<Arc<dyn Synthesizer>>,
    /// Locale passed to the transcriber
    pub stt_locale: String,
    /// Root of the static files; synthesized audio lands in `audio/` below it
    pub static_dir: PathBuf,
}

/// Builder for the API server
pub struct ApiServerBuilder {
    orchestrator: Arc<RequestOrchestrator>,
    port: u16,
    static_dir: PathBuf,
    session_idle: Duration,
    voice_settings: VoiceSettings,
    transcriber: Option<Arc<dyn Transcriber>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    stt_locale: String,
}

impl ApiServerBuilder {
    /// Create a builder around an orchestrator
    #[must_use]
    pub fn new(orchestrator: Arc<RequestOrchestrator>, port: u16) -> Self {
        Self {
            orchestrator,
            port,
            static_dir: PathBuf::from("static"),
            session_idle: SessionStore::DEFAULT_IDLE,
            voice_settings: VoiceSettings::default(),
            transcriber: None,
            synthesizer: None,
            stt_locale: DEFAULT_STT_LOCALE.to_string(),
        }
    }

    /// Assemble every collaborator from configuration
    ///
    /// # Errors
    ///
    /// Returns error if a backend or voice client cannot be constructed
    pub fn from_config(config: &Config) -> Result<Self> {
        let ttl = chrono::Duration::from_std(config.cache_ttl)
            .map_err(|e| Error::Config(format!("cache ttl out of range: {e}")))?;
        let orchestrator = RequestOrchestrator::new(ResponseCache::new(ttl), config.backend_chain()?);

        let mut builder = Self::new(Arc::new(orchestrator), config.api_server.port)
            .static_dir(config.api_server.static_dir.clone())
            .session_idle(config.session_idle)
            .stt_locale(config.voice.stt_locale.clone());

        if let Some(transcriber) = config.transcriber()? {
            builder = builder.transcriber(transcriber);
        }
        if let Some(synthesizer) = config.synthesizer()? {
            builder = builder.synthesizer(synthesizer);
        }

        Ok(builder)
    }

    /// Set the static files directory
    #[must_use]
    pub fn static_dir(mut self, dir: PathBuf) -> Self {
        self.static_dir = dir;
        self
    }

    /// Set the idle period after which a session and its audio are dropped
    #[must_use]
    pub const fn session_idle(mut self, idle: Duration) -> Self {
        self.session_idle = idle;
        self
    }

    /// Set the initial voice settings
    #[must_use]
    pub const fn voice_settings(mut self, settings: VoiceSettings) -> Self {
        self.voice_settings = settings;
        self
    }

    /// Set the speech-to-text client
    #[must_use]
    pub fn transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Set the text-to-speech client
    #[must_use]
    pub fn synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Set the transcription locale
    #[must_use]
    pub fn stt_locale(mut self, locale: String) -> Self {
        self.stt_locale = locale;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let sessions =
            SessionStore::with_audio_dir(self.session_idle, self.static_dir.join(AUDIO_DIR));

        let state = Arc::new(ApiState {
            orchestrator: self.orchestrator,
            sessions,
            voice_settings: Arc::new(RwLock::new(self.voice_settings)),
            transcriber: self.transcriber,
            synthesizer: self.synthesizer,
            stt_locale: self.stt_locale,
            static_dir: self.static_dir,
        });

        ApiServer {
            state,
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        Arc::clone(&self.state)
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.state))
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        self.state.sessions.purge_orphaned_audio();

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            tiers = ?self.state.orchestrator.chain().tier_names(),
            stt = self.state.transcriber.is_some(),
            tts = self.state.synthesizer.is_some(),
            "API server listening"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}

/// Build the full router over `state`
///
/// The page is served at `/` and everything under the static directory at
/// `/static`, which is where synthesized audio URLs point.
pub fn router(state: Arc<ApiState>) -> Router {
    let static_dir: &Path = &state.static_dir;
    let index_file = static_dir.join("index.html");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(assistant::router(Arc::clone(&state)))
        .merge(voice::router(Arc::clone(&state)))
        .merge(health::router())
        .merge(health::ready_router(Arc::clone(&state)))
        .nest_service("/static", ServeDir::new(static_dir))
        .route_service("/", ServeFile::new(index_file))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
