//! TOML configuration file loading
//!
//! Supports `~/.config/murmur/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MurmurConfigFile {
    /// Generative backend configuration
    #[serde(default)]
    pub gemini: GeminiFileConfig,

    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheFileConfig,

    /// Session configuration
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Gemini backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct GeminiFileConfig {
    /// API key (prefer `GEMINI_API_KEY`)
    pub api_key: Option<String>,

    /// REST API base URL
    pub api_base: Option<String>,

    /// Stateless model tiers in priority order
    pub models: Option<Vec<String>>,

    /// Conversational last-resort tier; empty string disables it
    pub chat_model: Option<String>,

    /// Time budget per tier in seconds
    pub tier_timeout_secs: Option<u64>,
}

/// Response cache configuration
#[derive(Debug, Default, Deserialize)]
pub struct CacheFileConfig {
    /// Entry lifetime in seconds
    pub ttl_secs: Option<u64>,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Seconds of inactivity after which a session's history is dropped
    pub idle_secs: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: Option<String>,

    /// Locale of spoken queries (e.g. "zh-TW")
    pub stt_locale: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Directory served as the web UI; synthesized audio goes under `audio/`
    pub static_dir: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `MurmurConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MurmurConfigFile {
    config_file_path().map_or_else(MurmurConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> MurmurConfigFile {
    if !path.exists() {
        return MurmurConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                MurmurConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MurmurConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/murmur/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("murmur").join("config.toml"))
}
