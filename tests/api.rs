//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use murmur_gateway::APOLOGY;
use murmur_gateway::api::SESSION_COOKIE;
use murmur_gateway::voice::{Synthesizer, Transcriber};
use tower::ServiceExt;

mod common;
use common::{
    StubBackend, StubSynthesizer, StubTranscriber, build_router, build_router_with_idle, chain_of,
};

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Cookie pair (`name=value`) from a response's `Set-Cookie` header
fn session_cookie(response: &axum::response::Response) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn multipart_request(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
    let boundary = "murmurtestboundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: audio/webm\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/process_audio")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_router(chain_of(&[]), dir.path(), None, None);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_ready_reports_backends() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("gemini/test", "hi");
    let (app, _) = build_router(chain_of(&[&primary]), dir.path(), None, None);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["checks"]["backends"]["status"], "ok");
    assert_eq!(json["checks"]["backends"]["message"], "gemini/test");
    assert_eq!(json["checks"]["speech_to_text"]["status"], "unavailable");
}

#[tokio::test]
async fn test_ready_degraded_without_backends() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_router(chain_of(&[]), dir.path(), None, None);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
}

#[tokio::test]
async fn test_text_input_answers_and_sets_cookie() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("primary", "It is noon.");
    let (app, _) = build_router(chain_of(&[&primary]), dir.path(), None, None);

    let response = app
        .oneshot(post_json("/text_input", r#"{"text": "What time is it?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).starts_with(&format!("{SESSION_COOKIE}=")));

    let json = body_json(response).await;
    assert_eq!(json["response_text"], "It is noon.");
    assert!(json["audio_url"].is_null());
}

#[tokio::test]
async fn test_text_input_writes_audio() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("primary", "It is noon.");
    let synthesizer = Arc::new(StubSynthesizer::default());
    let (app, _) = build_router(
        chain_of(&[&primary]),
        dir.path(),
        None,
        Some(Arc::clone(&synthesizer) as Arc<dyn Synthesizer>),
    );

    let response = app
        .oneshot(post_json("/text_input", r#"{"text": "What time is it?"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let session_id = cookie.split_once('=').unwrap().1.to_string();

    let json = body_json(response).await;
    assert_eq!(
        json["audio_url"],
        format!("static/audio/{session_id}.mp3").as_str()
    );

    let written = std::fs::read(dir.path().join("audio").join(format!("{session_id}.mp3"))).unwrap();
    assert_eq!(written, b"ID3 It is noon.");
    assert_eq!(synthesizer.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_text_input_missing_text() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("primary", "unused");
    let (app, _) = build_router(chain_of(&[&primary]), dir.path(), None, None);

    for body in [r"{}", r#"{"text": ""}"#, r#"{"text": "   "}"#, "not json"] {
        let response = app
            .clone()
            .oneshot(post_json("/text_input", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let json = body_json(response).await;
        assert_eq!(json["error"], "No text provided");
    }

    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn test_text_input_apology_when_backends_fail() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::over_quota("primary");
    let (app, state) = build_router(chain_of(&[&primary]), dir.path(), None, None);

    let response = app
        .oneshot(post_json("/text_input", r#"{"text": "Hello"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["response_text"], APOLOGY);
    assert_eq!(state.orchestrator.cache_len().await, 0);
}

#[tokio::test]
async fn test_history_follows_session_cookie() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("primary", "It is noon.");
    let (app, _) = build_router(chain_of(&[&primary]), dir.path(), None, None);

    let response = app
        .clone()
        .oneshot(post_json("/text_input", r#"{"text": "What time is it?"}"#))
        .await
        .unwrap();
    let cookie = session_cookie(&response);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/history")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let json = body_json(response).await;
    let history = json["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["user"], "What time is it?");
    assert_eq!(history[0]["system"], "It is noon.");
    assert!(history[0]["timestamp"].is_string());

    // A different session sees nothing
    let response = app
        .oneshot(Request::builder().uri("/history").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert!(json["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_voice_settings() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = build_router(chain_of(&[]), dir.path(), None, None);

    let response = app
        .clone()
        .oneshot(post_json(
            "/update_voice_settings",
            r#"{"volume": 0.5, "rate": "1.5", "pitch": 2}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["settings"]["volume"], 0.5);
    assert_eq!(json["settings"]["rate"], 1.5);
    assert_eq!(json["settings"]["pitch"], 2.0);

    let settings = *state.voice_settings.read().await;
    assert!((settings.rate - 1.5).abs() < f32::EPSILON);

    let response = app
        .oneshot(Request::builder().uri("/voice_settings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["volume"], 0.5);
}

#[tokio::test]
async fn test_update_voice_settings_rejects_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = build_router(chain_of(&[]), dir.path(), None, None);

    for body in ["", "null", "{}", r#"{"rate": "fast"}"#, "{"] {
        let response = app
            .clone()
            .oneshot(post_json("/update_voice_settings", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        let json = body_json(response).await;
        assert!(json["error"].is_string());
    }

    let settings = *state.voice_settings.read().await;
    assert!((settings.rate - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_empty_settings_object_keeps_current_settings() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = build_router(chain_of(&[]), dir.path(), None, None);

    app.clone()
        .oneshot(post_json("/update_voice_settings", r#"{"rate": 1.5}"#))
        .await
        .unwrap();
    let response = app
        .oneshot(post_json("/update_voice_settings", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "No settings provided");

    let settings = *state.voice_settings.read().await;
    assert!((settings.rate - 1.5).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_missing_voice_fields_reset_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = build_router(chain_of(&[]), dir.path(), None, None);

    app.clone()
        .oneshot(post_json("/update_voice_settings", r#"{"volume": 0.2, "pitch": 0.8}"#))
        .await
        .unwrap();
    let response = app
        .oneshot(post_json("/update_voice_settings", r#"{"rate": 1.2}"#))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["settings"]["volume"], 1.0);
    assert_eq!(json["settings"]["pitch"], 1.0);
}

#[tokio::test]
async fn test_process_audio_without_transcriber() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("primary", "unused");
    let (app, _) = build_router(chain_of(&[&primary]), dir.path(), None, None);

    let response = app
        .oneshot(multipart_request("audio", "clip.webm", b"RIFFfake"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn test_process_audio_answers_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("primary", "It is noon.");
    let transcriber: Arc<dyn Transcriber> = Arc::new(StubTranscriber {
        transcript: Some("What time is it?".to_string()),
    });
    let (app, _) = build_router(chain_of(&[&primary]), dir.path(), Some(transcriber), None);

    let response = app
        .oneshot(multipart_request("audio", "clip.webm", b"RIFFfake"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["input_text"], "What time is it?");
    assert_eq!(json["response_text"], "It is noon.");
}

#[tokio::test]
async fn test_process_audio_missing_field() {
    let dir = tempfile::tempdir().unwrap();
    let transcriber: Arc<dyn Transcriber> = Arc::new(StubTranscriber {
        transcript: Some("unused".to_string()),
    });
    let (app, _) = build_router(chain_of(&[]), dir.path(), Some(transcriber), None);

    let response = app
        .clone()
        .oneshot(multipart_request("file", "clip.webm", b"RIFFfake"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "No audio file provided");

    let response = app
        .oneshot(post_json("/process_audio", r#"{"audio": "nope"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_process_audio_transcription_failure() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("primary", "unused");
    let transcriber: Arc<dyn Transcriber> = Arc::new(StubTranscriber { transcript: None });
    let (app, _) = build_router(chain_of(&[&primary]), dir.path(), Some(transcriber), None);

    let response = app
        .oneshot(multipart_request("audio", "clip.webm", b"RIFFfake"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(primary.calls(), 0);
}

fn audio_files(static_dir: &std::path::Path) -> usize {
    std::fs::read_dir(static_dir.join("audio")).map_or(0, Iterator::count)
}

#[tokio::test]
async fn test_idle_sessions_release_their_audio() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("primary", "It is noon.");
    let synthesizer: Arc<dyn Synthesizer> = Arc::new(StubSynthesizer::default());
    let (app, state) = build_router_with_idle(
        chain_of(&[&primary]),
        dir.path(),
        None,
        Some(synthesizer),
        std::time::Duration::from_millis(100),
    );

    // Clients without cookies get a fresh session, and a file, every time
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(post_json("/text_input", r#"{"text": "What time is it?"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(audio_files(dir.path()), 5);

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    state.sessions.run_pending_tasks();

    assert!(state.sessions.is_empty());
    assert_eq!(audio_files(dir.path()), 0);
}

#[tokio::test]
async fn test_audio_survives_while_session_is_live() {
    let dir = tempfile::tempdir().unwrap();
    let primary = StubBackend::answering("primary", "It is noon.");
    let synthesizer: Arc<dyn Synthesizer> = Arc::new(StubSynthesizer::default());
    let (app, state) = build_router(chain_of(&[&primary]), dir.path(), None, Some(synthesizer));

    let response = app
        .oneshot(post_json("/text_input", r#"{"text": "What time is it?"}"#))
        .await
        .unwrap();
    let cookie = session_cookie(&response);
    let session_id = cookie.split_once('=').unwrap().1.to_string();

    state.sessions.run_pending_tasks();
    assert_eq!(audio_files(dir.path()), 1);

    state.sessions.remove(&session_id);
    state.sessions.run_pending_tasks();
    assert_eq!(audio_files(dir.path()), 0);
}
