mod common;

use axum::http::StatusCode;
use base64::Engine;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{TestApp, BUTTON, PNG_1X1};
use ui_forge::v0::UpstreamError;

#[tokio::test]
async fn simple_button_completes_on_the_first_attempt() {
    let app = TestApp::new(vec![Ok(BUTTON.to_string())]);

    let (status, body) = app
        .post("/api/generate", json!({"prompt": "Create a simple button component"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["attempts"], 1);
    assert_eq!(body["template"], "general");
    assert_eq!(body["code"], BUTTON);
    assert!(body["css"].as_str().unwrap().contains(".bg-primary{"));
    assert_eq!(body["metrics"]["code_length"], BUTTON.len());
    assert_eq!(app.api.calls(), 1);

    let (status, record) = app.get(&format!("/api/generations/{}", body["id"].as_str().unwrap())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "completed");
    assert_eq!(record["assets"], json!([]));
}

#[tokio::test]
async fn upstream_outage_fails_without_retrying() {
    let app = TestApp::new(vec![Err(UpstreamError::Server {
        status: 503,
        reason: "Service Unavailable".into(),
    })]);

    let (status, body) = app.post("/api/generate", json!({"prompt": "A pricing table"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("temporarily unavailable"), "{body}");
    assert_eq!(app.api.calls(), 1);

    let (_, list) = app.get("/api/generations").await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["generations"][0]["status"], "failed");
}

#[tokio::test]
async fn invalid_first_attempt_is_retried_with_the_reason() {
    let app = TestApp::new(vec![Ok("<div>Just some markup</div>".into()), Ok(BUTTON.to_string())]);

    let (status, body) = app.post("/api/generate", json!({"prompt": "A login form"})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(body["attempts"], 2);
    assert_eq!(body["template"], "form");

    let requests = app.api.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1]
        .user_prompt
        .contains("FIX REQUIRED: Code must include a React component function"));
}

#[tokio::test]
async fn oversized_reference_image_is_rejected_before_any_work() {
    let app = TestApp::new(vec![Ok(BUTTON.to_string())]);
    let payload = base64::engine::general_purpose::STANDARD.encode(vec![0u8; 5 * 1024 * 1024 + 4096]);

    let (status, body) = app
        .post(
            "/api/generate",
            json!({"prompt": "Match this", "referenceImage": format!("data:image/png;base64,{payload}")}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("too large"), "{body}");
    assert_eq!(app.api.calls(), 0);

    let (_, list) = app.get("/api/generations").await;
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn reference_image_switches_to_vision_prompts() {
    let app = TestApp::new(vec![Ok(BUTTON.to_string())]);

    let (status, _) = app
        .post("/api/generate", json!({"prompt": "Match this card", "referenceImage": PNG_1X1}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let request = &app.api.requests()[0];
    assert_eq!(request.image.as_deref(), Some(PNG_1X1));
    assert!(request.system_prompt.contains("VISION MODE"));
    assert!(request.user_prompt.starts_with("[Reference image request]"));
}

#[tokio::test]
async fn script_tags_exhaust_retries_with_unprocessable_entity() {
    let bad = "export default function Widget() { return <div><script>alert(1)</script></div>; }";
    let app = TestApp::new(vec![Ok(bad.into()), Ok(bad.into())]);

    let (status, body) = app.post("/api/generate", json!({"prompt": "A widget"})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"], "Script tags are not allowed");
    assert_eq!(app.api.calls(), 2);

    let (_, list) = app.get("/api/generations").await;
    assert_eq!(list["generations"][0]["status"], "failed");
    assert_eq!(list["generations"][0]["code"], bad);
}

#[tokio::test]
async fn input_errors_are_bad_requests() {
    let app = TestApp::new(Vec::new());

    let (status, body) = app.post("/api/generate", json!({"prompt": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A valid prompt is required");

    let (status, _) = app
        .post("/api/generate", json!({"prompt": "x", "referenceImage": "https://example.com/a.png"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.request_text(axum::http::Method::POST, "/api/generate", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_api_key_is_a_server_error() {
    let app = TestApp::unconfigured();

    let (status, body) = app.post("/api/generate", json!({"prompt": "A button"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "V0_API_KEY is not configured");

    let (_, list) = app.get("/api/generations").await;
    assert_eq!(list["total"], 0);
}
