//! Wire-format tests for the Gemini client against a local mock server.
//!
//! An axum app bound to 127.0.0.1:0 plays the `generateContent` endpoint:
//! it records what it received and answers with a canned status and body.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use physics_tutor::prompts::DEFAULT_SYSTEM_INSTRUCTION;
use physics_tutor::{ask, ask_to_file, ErrorKind, ImageAttachment, TutorConfig, TutorError};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

// ── Mock server ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Received {
    path: String,
    api_key: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct Mock {
    received: Arc<Mutex<Vec<Received>>>,
    status: StatusCode,
    body: Value,
    retry_after: Option<&'static str>,
}

async fn handler(State(mock): State<Mock>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    mock.received.lock().unwrap().push(Received {
        path: uri.path().to_string(),
        api_key: headers
            .get("x-goog-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    let mut response = (mock.status, axum::Json(mock.body.clone())).into_response();
    if let Some(secs) = mock.retry_after {
        response
            .headers_mut()
            .insert("retry-after", HeaderValue::from_static(secs));
    }
    response
}

/// Start the mock; returns its base URL and the request log.
async fn start_mock(
    status: StatusCode,
    body: Value,
    retry_after: Option<&'static str>,
) -> (String, Arc<Mutex<Vec<Received>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(handler).with_state(Mock {
        received: Arc::clone(&received),
        status,
        body,
        retry_after,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), received)
}

fn config(base_url: &str) -> TutorConfig {
    TutorConfig::builder()
        .base_url(base_url)
        .api_key("test-key")
        .api_timeout_secs(10)
        .build()
        .unwrap()
}

fn ok_body(parts: Value) -> Value {
    json!({
        "candidates": [{ "content": { "role": "model", "parts": parts }, "finishReason": "STOP" }],
        "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 34, "totalTokenCount": 46 }
    })
}

// ── Request shape ────────────────────────────────────────────────────────────

#[tokio::test]
async fn sends_parts_instruction_and_key() {
    let (url, received) = start_mock(
        StatusCode::OK,
        ok_body(json!([{ "text": "## Solution\n\n" }, { "text": "$F = ma$" }])),
        None,
    )
    .await;

    let question = "A 2 kg block is pushed with 10 N. Acceleration?";
    let out = ask(Some(question.into()), None, &config(&url)).await.unwrap();

    assert_eq!(out.answer.as_str(), "## Solution\n\n$F = ma$");
    assert_eq!(out.stats.input_tokens, Some(12));
    assert_eq!(out.stats.output_tokens, Some(34));
    assert_eq!(out.stats.provider, "gemini");
    assert!(out.rendered.html.contains("<math"), "got: {}", out.rendered.html);

    let log = received.lock().unwrap().clone();
    assert_eq!(log.len(), 1);
    let req = &log[0];
    assert_eq!(req.path, "/v1beta/models/gemini-2.5-flash:generateContent");
    assert_eq!(req.api_key.as_deref(), Some("test-key"));
    assert_eq!(req.body["contents"][0]["role"], "user");
    assert_eq!(req.body["contents"][0]["parts"], json!([{ "text": question }]));
    assert_eq!(
        req.body["systemInstruction"]["parts"][0]["text"],
        DEFAULT_SYSTEM_INSTRUCTION
    );
    assert!(req.body.get("generationConfig").is_none());
}

#[tokio::test]
async fn image_goes_as_inline_data_after_text() {
    let (url, received) = start_mock(StatusCode::OK, ok_body(json!([{ "text": "ok" }])), None).await;

    let mut png = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image::RgbImage::new(2, 2))
        .write_to(&mut png, image::ImageFormat::Png)
        .unwrap();
    let image = ImageAttachment::from_bytes(png.into_inner()).unwrap();

    ask(Some("See picture".into()), Some(image), &config(&url))
        .await
        .unwrap();

    let body = received.lock().unwrap()[0].body.clone();
    let parts = body["contents"][0]["parts"].as_array().unwrap().clone();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["text"], "See picture");
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    assert!(parts[1]["inlineData"]["data"].as_str().unwrap().starts_with("iVBORw0KGgo"));
}

#[tokio::test]
async fn generation_config_is_sent_when_tuned() {
    let (url, received) = start_mock(StatusCode::OK, ok_body(json!([{ "text": "ok" }])), None).await;
    let config = TutorConfig::builder()
        .base_url(&url)
        .api_key("k")
        .model("gemini-2.5-pro")
        .temperature(0.2)
        .max_tokens(2048)
        .build()
        .unwrap();

    ask(Some("q".into()), None, &config).await.unwrap();

    let req = received.lock().unwrap()[0].clone();
    assert_eq!(req.path, "/v1beta/models/gemini-2.5-pro:generateContent");
    assert_eq!(req.body["generationConfig"]["maxOutputTokens"], 2048);
    let t = req.body["generationConfig"]["temperature"].as_f64().unwrap();
    assert!((t - 0.2).abs() < 1e-6);
}

// ── Response handling ────────────────────────────────────────────────────────

#[tokio::test]
async fn thought_parts_are_skipped() {
    let (url, _) = start_mock(
        StatusCode::OK,
        ok_body(json!([
            { "text": "Let me think about forces...", "thought": true },
            { "text": "**Difficulty:** Easy" }
        ])),
        None,
    )
    .await;

    let out = ask(Some("q".into()), None, &config(&url)).await.unwrap();
    assert_eq!(out.answer.as_str(), "**Difficulty:** Easy");
}

#[tokio::test]
async fn blocked_prompt_is_empty_response() {
    let (url, _) = start_mock(
        StatusCode::OK,
        json!({ "promptFeedback": { "blockReason": "SAFETY" } }),
        None,
    )
    .await;

    let err = ask(Some("q".into()), None, &config(&url)).await.unwrap_err();
    match err {
        TutorError::EmptyResponse { reason } => assert!(reason.contains("SAFETY"), "got: {reason}"),
        other => panic!("expected EmptyResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorised_maps_to_auth_error() {
    let (url, _) = start_mock(
        StatusCode::FORBIDDEN,
        json!({ "error": { "code": 403, "message": "API key not valid.", "status": "PERMISSION_DENIED" } }),
        None,
    )
    .await;

    let err = ask(Some("q".into()), None, &config(&url)).await.unwrap_err();
    assert!(matches!(err, TutorError::AuthError { .. }), "got {err:?}");
    assert!(err.to_string().contains("API key not valid."));
}

#[tokio::test]
async fn rate_limit_honours_retry_after() {
    let (url, _) = start_mock(
        StatusCode::TOO_MANY_REQUESTS,
        json!({ "error": { "message": "quota", "status": "RESOURCE_EXHAUSTED" } }),
        Some("17"),
    )
    .await;

    let err = ask(Some("q".into()), None, &config(&url)).await.unwrap_err();
    assert!(
        matches!(err, TutorError::RateLimitExceeded { retry_after_secs: Some(17), .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn server_error_carries_detail_into_user_message() {
    let (url, _) = start_mock(
        StatusCode::SERVICE_UNAVAILABLE,
        json!({ "error": { "message": "The model is overloaded.", "status": "UNAVAILABLE" } }),
        None,
    )
    .await;

    let err = ask(Some("q".into()), None, &config(&url)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Service);
    let message = err.user_message();
    assert!(message.contains("HTTP 503"), "got: {message}");
    assert!(message.contains("The model is overloaded."), "got: {message}");
}

#[tokio::test]
async fn missing_key_fails_at_call_time_without_network() {
    let (url, received) = start_mock(StatusCode::OK, ok_body(json!([{ "text": "ok" }])), None).await;
    let config = TutorConfig::builder().base_url(&url).build().unwrap();

    let err = ask(Some("q".into()), None, &config).await.unwrap_err();
    assert!(matches!(err, TutorError::ProviderNotConfigured { .. }), "got {err:?}");
    assert!(received.lock().unwrap().is_empty());
}

// ── File output ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn ask_to_file_writes_a_standalone_page() {
    let (url, _) = start_mock(
        StatusCode::OK,
        ok_body(json!([{ "text": "## Final Answer\n\n```\nv = 14.1 m/s\n```\n" }])),
        None,
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("answer.html");

    let stats = ask_to_file(Some("q".into()), None, &path, &config(&url))
        .await
        .unwrap();

    assert_eq!(stats.content_parts, 1);
    let html = std::fs::read_to_string(&path).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<h2>Final Answer</h2>"));
    assert!(html.contains("v = 14.1 m/s"));
}
