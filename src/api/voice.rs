//! Voice settings endpoints and reply synthesis

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use super::{AUDIO_DIR, ApiError, ApiState, Session};
use crate::history::audio_file_name;
use crate::voice::{VoiceSettings, VoiceSettingsUpdate};

/// Build voice settings router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/update_voice_settings", post(update_voice_settings))
        .route("/voice_settings", get(voice_settings))
        .with_state(state)
}

/// Settings update response
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub settings: VoiceSettings,
}

/// Current voice settings
async fn voice_settings(State(state): State<Arc<ApiState>>) -> Json<VoiceSettings> {
    Json(*state.voice_settings.read().await)
}

/// Replace the voice settings
///
/// Fields may be numbers or numeric strings; omitted fields reset to `1.0`.
/// A body naming no field is rejected.
async fn update_voice_settings(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<SettingsResponse>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("No settings provided".to_string()));
    }

    let update: Option<VoiceSettingsUpdate> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid settings: {e}")))?;
    let update = update
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No settings provided".to_string()))?;

    let settings = update.resolve().map_err(ApiError::BadRequest)?;
    *state.voice_settings.write().await = settings;

    tracing::info!(
        volume = settings.volume,
        rate = settings.rate,
        pitch = settings.pitch,
        "voice settings updated"
    );

    Ok(Json(SettingsResponse {
        success: true,
        settings,
    }))
}

/// Synthesize `text` for `session` and return the audio's URL
///
/// The synthesizer sees a snapshot of the settings taken here, so a settings
/// update mid-request does not affect it. Any failure is logged and yields
/// `None`; the text reply is still delivered.
pub(super) async fn speak(state: &ApiState, session: &Session, text: &str) -> Option<String> {
    let synthesizer = state.synthesizer.as_ref()?;
    let settings = *state.voice_settings.read().await;

    let audio = match synthesizer.synthesize(text, &settings).await {
        Ok(audio) => audio,
        Err(e) => {
            tracing::warn!(error = %e, "speech synthesis failed, replying with text only");
            return None;
        }
    };

    let dir = state.static_dir.join(AUDIO_DIR);
    let file_name = audio_file_name(session.id());

    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        tracing::warn!(path = %dir.display(), error = %e, "failed to create audio directory");
        return None;
    }

    let path = dir.join(&file_name);
    if let Err(e) = tokio::fs::write(&path, audio).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to write synthesized audio");
        return None;
    }

    tracing::debug!(path = %path.display(), "wrote synthesized audio");
    Some(format!("static/{AUDIO_DIR}/{file_name}"))
}
