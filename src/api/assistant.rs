//! Query endpoints: typed and spoken questions, and the session's history

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::voice::speak;
use super::{ApiError, ApiState, Session};
use crate::history::ChatHistoryEntry;

/// Largest accepted audio upload
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

/// Build query router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/text_input", post(text_input))
        .route(
            "/process_audio",
            post(process_audio).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)),
        )
        .route("/history", get(history))
        .with_state(state)
}

/// Text query request
#[derive(Debug, Deserialize)]
pub struct TextInputRequest {
    pub text: Option<String>,
}

/// Reply to a text query
#[derive(Debug, Serialize)]
pub struct TextInputResponse {
    pub response_text: String,
    pub audio_url: Option<String>,
}

/// Reply to a spoken query
#[derive(Debug, Serialize)]
pub struct ProcessAudioResponse {
    pub input_text: String,
    pub response_text: String,
    pub audio_url: Option<String>,
}

/// Session history response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<ChatHistoryEntry>,
}

/// Answer a typed query
async fn text_input(
    State(state): State<Arc<ApiState>>,
    session: Session,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: Option<TextInputRequest> = serde_json::from_slice(&body).ok();
    let text = request
        .and_then(|r| r.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No text provided".to_string()))?;

    tracing::info!(session = %session.id(), "text query");
    let response_text = answer(&state, &session, &text).await;
    let audio_url = speak(&state, &session, &response_text).await;

    Ok(session.attach(
        Json(TextInputResponse {
            response_text,
            audio_url,
        })
        .into_response(),
    ))
}

/// Transcribe and answer a spoken query
///
/// Expects a multipart upload with the recording in the `audio` field.
async fn process_audio(
    State(state): State<Arc<ApiState>>,
    session: Session,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart =
        multipart.map_err(|_| ApiError::BadRequest("No audio file provided".to_string()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("audio") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("audio.webm").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {e}")))?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, audio) = upload
        .filter(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No audio file provided".to_string()))?;

    let transcriber = state
        .transcriber
        .as_ref()
        .ok_or(ApiError::NotConfigured("Speech recognition is not configured"))?;

    tracing::info!(session = %session.id(), bytes = audio.len(), "audio query");
    let input_text = transcriber
        .transcribe(&audio, &file_name, &state.stt_locale)
        .await
        .map_err(|e| ApiError::TranscriptionFailed(e.to_string()))?;

    let response_text = answer(&state, &session, &input_text).await;
    let audio_url = speak(&state, &session, &response_text).await;

    Ok(session.attach(
        Json(ProcessAudioResponse {
            input_text,
            response_text,
            audio_url,
        })
        .into_response(),
    ))
}

/// The caller's chat history, oldest first
async fn history(State(state): State<Arc<ApiState>>, session: Session) -> Response {
    let history = state.sessions.snapshot(session.id()).await;
    session.attach(Json(HistoryResponse { history }).into_response())
}

/// Resolve a query through the orchestrator against the session's history
async fn answer(state: &ApiState, session: &Session, query: &str) -> String {
    let history = state.sessions.history(session.id());
    let mut history = history.lock().await;
    let reply = state.orchestrator.handle(query, &mut history).await;

    tracing::debug!(
        session = %session.id(),
        cached = reply.cached,
        "query answered"
    );
    reply.response_text
}
