//! Configuration management for Murmur gateway
//!
//! Every value is resolved env > TOML file > default.

pub mod file;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    Backend, DEFAULT_TIER_TIMEOUT, FallbackChain, GEMINI_API_BASE, GeminiBackend,
    GeminiChatBackend,
};
use crate::voice::{SpeechToText, Synthesizer, TextToSpeech, Transcriber};
use crate::{Error, Result};

/// Default stateless model tiers, highest priority first
pub const DEFAULT_MODELS: [&str; 2] = ["gemini-2.0-flash", "gemini-1.5-pro"];

/// Default conversational last-resort tier
pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.0-pro";

/// Default locale for spoken queries
pub const DEFAULT_STT_LOCALE: &str = "zh-TW";

/// Murmur gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Generative backend configuration
    pub gemini: GeminiConfig,

    /// Response cache entry lifetime
    pub cache_ttl: Duration,

    /// Idle period after which a session's history is dropped
    pub session_idle: Duration,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,
}

/// Gemini backend configuration
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key (from `GEMINI_API_KEY`)
    pub api_key: Option<String>,

    /// REST API base URL
    pub api_base: String,

    /// Stateless model tiers in priority order
    pub models: Vec<String>,

    /// Conversational tier tried after the stateless ones
    pub chat_model: Option<String>,

    /// Time budget for each tier
    pub tier_timeout: Duration,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("models", &self.models)
            .field("chat_model", &self.chat_model)
            .field("tier_timeout", &self.tier_timeout)
            .finish()
    }
}

/// Voice processing configuration
#[derive(Debug, Clone, Default)]
pub struct VoiceConfig {
    /// STT model; provider default when unset
    pub stt_model: Option<String>,

    /// Locale of spoken queries
    pub stt_locale: String,

    /// TTS model; provider default when unset
    pub tts_model: Option<String>,

    /// TTS voice identifier; provider default when unset
    pub tts_voice: Option<String>,
}

/// API keys for external voice services
#[derive(Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper STT and TTS)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("openai", &self.openai.is_some())
            .field("deepgram", &self.deepgram.is_some())
            .field("elevenlabs", &self.elevenlabs.is_some())
            .finish()
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI, synthesized audio)
    pub static_dir: PathBuf,
}

/// Read an env var, treating empty values as unset
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a numeric env var
///
/// # Errors
///
/// Returns error naming the variable if the value does not parse
fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>) -> Result<Option<T>> {
    non_empty(value)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| Error::Config(format!("{name} must be a number, got {v:?}")))
        })
        .transpose()
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a numeric setting does not parse or is out of range
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(|name| std::env::var(name).ok(), fc)
    }

    /// Build configuration from an env lookup and a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if a numeric setting does not parse or is out of range
    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        fc: file::MurmurConfigFile,
    ) -> Result<Self> {
        // Gemini tiers (env > toml > default)
        let models = non_empty(env("MURMUR_MODELS"))
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .or(fc.gemini.models)
            .unwrap_or_else(|| DEFAULT_MODELS.iter().map(ToString::to_string).collect());

        // An explicitly empty chat model disables the conversational tier
        let chat_model = env("MURMUR_CHAT_MODEL")
            .or(fc.gemini.chat_model)
            .map_or_else(
                || Some(DEFAULT_CHAT_MODEL.to_string()),
                |m| non_empty(Some(m)),
            );

        let tier_timeout_secs = parse_var::<u64>(
            "MURMUR_TIER_TIMEOUT_SECS",
            env("MURMUR_TIER_TIMEOUT_SECS"),
        )?
        .or(fc.gemini.tier_timeout_secs);
        let tier_timeout = match tier_timeout_secs {
            Some(0) => {
                return Err(Error::Config(
                    "tier timeout must be at least one second".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIER_TIMEOUT,
        };

        let gemini = GeminiConfig {
            api_key: non_empty(env("GEMINI_API_KEY")).or(non_empty(fc.gemini.api_key)),
            api_base: non_empty(env("GEMINI_API_BASE"))
                .or(fc.gemini.api_base)
                .unwrap_or_else(|| GEMINI_API_BASE.to_string()),
            models,
            chat_model,
            tier_timeout,
        };

        let cache_ttl = Duration::from_secs(
            parse_var::<u64>("MURMUR_CACHE_TTL_SECS", env("MURMUR_CACHE_TTL_SECS"))?
                .or(fc.cache.ttl_secs)
                .unwrap_or(60 * 60),
        );

        let session_idle = Duration::from_secs(
            parse_var::<u64>("MURMUR_SESSION_IDLE_SECS", env("MURMUR_SESSION_IDLE_SECS"))?
                .or(fc.session.idle_secs)
                .unwrap_or(24 * 60 * 60),
        );
        if session_idle.is_zero() {
            return Err(Error::Config(
                "session idle period must be at least one second".to_string(),
            ));
        }

        // Voice config (env > toml > provider default)
        let voice = VoiceConfig {
            stt_model: non_empty(env("MURMUR_STT_MODEL")).or(fc.voice.stt_model),
            stt_locale: non_empty(env("MURMUR_STT_LOCALE"))
                .or(fc.voice.stt_locale)
                .unwrap_or_else(|| DEFAULT_STT_LOCALE.to_string()),
            tts_model: non_empty(env("MURMUR_TTS_MODEL")).or(fc.voice.tts_model),
            tts_voice: non_empty(env("MURMUR_TTS_VOICE")).or(fc.voice.tts_voice),
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: non_empty(env("OPENAI_API_KEY")).or(non_empty(fc.api_keys.openai)),
            deepgram: non_empty(env("DEEPGRAM_API_KEY")).or(non_empty(fc.api_keys.deepgram)),
            elevenlabs: non_empty(env("ELEVENLABS_API_KEY"))
                .or(non_empty(fc.api_keys.elevenlabs)),
        };

        // API server config (env > toml > default)
        let port = match parse_var::<u16>("MURMUR_PORT", env("MURMUR_PORT"))? {
            Some(port) => Some(port),
            None => parse_var::<u16>("PORT", env("PORT"))?,
        };
        let api_server = ApiServerConfig {
            port: port.or(fc.server.port).unwrap_or(5000),
            static_dir: non_empty(env("MURMUR_STATIC_DIR"))
                .or(fc.server.static_dir)
                .map_or_else(|| PathBuf::from("static"), PathBuf::from),
        };

        Ok(Self {
            gemini,
            cache_ttl,
            session_idle,
            voice,
            api_keys,
            api_server,
        })
    }

    /// Build the backend fallback chain from the configured tiers
    ///
    /// Without a Gemini API key the chain is empty and every query gets the
    /// apology reply.
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be built
    pub fn backend_chain(&self) -> Result<FallbackChain> {
        let Some(api_key) = &self.gemini.api_key else {
            tracing::warn!("GEMINI_API_KEY not set, every query will get the apology reply");
            return Ok(FallbackChain::new(Vec::new()));
        };

        let stateless = |model: &str| -> Result<GeminiBackend> {
            Ok(GeminiBackend::new(
                api_key.clone(),
                model.to_string(),
                self.gemini.tier_timeout,
            )?
            .with_base_url(self.gemini.api_base.clone()))
        };

        let mut tiers: Vec<Arc<dyn Backend>> = Vec::new();
        for model in &self.gemini.models {
            tiers.push(Arc::new(stateless(model)?));
        }
        if let Some(model) = &self.gemini.chat_model {
            tiers.push(Arc::new(GeminiChatBackend::new(stateless(model)?)));
        }

        let chain = FallbackChain::new(tiers).with_tier_timeout(self.gemini.tier_timeout);
        tracing::info!(tiers = ?chain.tier_names(), "backend chain ready");
        Ok(chain)
    }

    /// Build the speech-to-text client, preferring Whisper over Deepgram
    ///
    /// Returns `None` when no STT key is configured.
    ///
    /// # Errors
    ///
    /// Returns error if the client rejects its configuration
    pub fn transcriber(&self) -> Result<Option<Arc<dyn Transcriber>>> {
        if let Some(key) = &self.api_keys.openai {
            let model = self.voice.stt_model.clone().unwrap_or_else(|| "whisper-1".to_string());
            tracing::info!(provider = "whisper", model = %model, "speech-to-text ready");
            let stt: Arc<dyn Transcriber> = Arc::new(SpeechToText::new_whisper(key.clone(), model)?);
            return Ok(Some(stt));
        }

        if let Some(key) = &self.api_keys.deepgram {
            let model = self.voice.stt_model.clone().unwrap_or_else(|| "nova-2".to_string());
            tracing::info!(provider = "deepgram", model = %model, "speech-to-text ready");
            let stt: Arc<dyn Transcriber> = Arc::new(SpeechToText::new_deepgram(key.clone(), model)?);
            return Ok(Some(stt));
        }

        tracing::warn!("no STT key configured, audio queries are disabled");
        Ok(None)
    }

    /// Build the text-to-speech client, preferring `OpenAI` over ElevenLabs
    ///
    /// Returns `None` when no TTS key is configured.
    ///
    /// # Errors
    ///
    /// Returns error if the client rejects its configuration
    pub fn synthesizer(&self) -> Result<Option<Arc<dyn Synthesizer>>> {
        if let Some(key) = &self.api_keys.openai {
            let tts: Arc<dyn Synthesizer> = Arc::new(TextToSpeech::new_openai(
                key.clone(),
                self.voice.tts_voice.clone().unwrap_or_else(|| "alloy".to_string()),
                self.voice.tts_model.clone().unwrap_or_else(|| "tts-1".to_string()),
            )?);
            tracing::info!(provider = "openai", "text-to-speech ready");
            return Ok(Some(tts));
        }

        if let Some(key) = &self.api_keys.elevenlabs {
            let tts: Arc<dyn Synthesizer> = Arc::new(TextToSpeech::new_elevenlabs(
                key.clone(),
                self.voice
                    .tts_voice
                    .clone()
                    .unwrap_or_else(|| "21m00Tcm4TlvDq8ikWAM".to_string()),
                self.voice
                    .tts_model
                    .clone()
                    .unwrap_or_else(|| "eleven_multilingual_v2".to_string()),
            )?);
            tracing::info!(provider = "elevenlabs", "text-to-speech ready");
            return Ok(Some(tts));
        }

        tracing::warn!("no TTS key configured, replies will be text only");
        Ok(None)
    }
}
