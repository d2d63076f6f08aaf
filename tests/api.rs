use avatar::{AvatarApi, AvatarCredential, CredentialEncoding, HttpAvatarApi};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use lesson::{CanChat, MockChat};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use tutor::{AppState, TutorConfig, router};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

fn unused_avatar() -> Arc<dyn AvatarApi> {
    let cred = AvatarCredential::new("user:pw", CredentialEncoding::Raw).unwrap();
    Arc::new(HttpAvatarApi::new("http://127.0.0.1:9", cred))
}

fn app_with(chat: Arc<MockChat>, config: TutorConfig) -> (Router, Arc<AppState>) {
    let chat: Arc<dyn CanChat> = chat;
    let state = Arc::new(AppState::new(chat, unused_avatar(), config));
    (router(state.clone()), state)
}

fn app(chat: Arc<MockChat>) -> (Router, Arc<AppState>) {
    app_with(chat, TutorConfig::default())
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bare(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn upload(uri: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "image/png")
        .header("x-file-name", "fruit.png")
        .body(Body::from(bytes.to_vec()))
        .unwrap()
}

async fn new_session(app: &Router) -> String {
    let (status, body) = send(app, bare("POST", "/api/sessions")).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn index_starts_a_session() {
    let (app, state) = app(Arc::new(MockChat::new()));
    let resp = app.clone().oneshot(bare("GET", "/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let html = std::str::from_utf8(&body).unwrap();
    assert!(html.contains("const BOOT = {\"session\":"));
    assert!(html.contains("<video"));
    assert_eq!(state.sessions.len().await, 1);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let (app, _) = app(Arc::new(MockChat::new()));
    let uri = format!("/api/sessions/{}", uuid::Uuid::new_v4());
    let (status, body) = send(&app, bare("GET", &uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn lesson_runs_question_answer_feedback() {
    let chat = Arc::new(
        MockChat::new()
            .reply("What fruit do you see?")
            .reply("Yes, it is an apple!"),
    );
    let (app, _) = app(chat.clone());
    let id = new_session(&app).await;

    let (status, body) = send(&app, upload(&format!("/api/sessions/{id}/image"), PNG)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "What fruit do you see?");
    assert_eq!(body["session"]["transcript"].as_array().unwrap().len(), 1);
    assert_eq!(body["session"]["image"]["mime"], "image/png");
    assert_eq!(body["session"]["image"]["name"], "fruit.png");
    assert!(
        body["session"]["image"]["data_url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );

    let (status, body) = send(
        &app,
        post_json(&format!("/api/sessions/{id}/chat"), json!({"text": "an apple"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Yes, it is an apple!");
    let transcript = body["session"]["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[1], json!({"role": "user", "content": "an apple"}));
    assert_eq!(transcript[2]["role"], "assistant");
    assert_eq!(body["session"]["image"]["name"], "fruit.png");
    assert!(body["session"]["image"].get("data_url").is_none());

    let (_, body) = send(&app, bare("GET", &format!("/api/sessions/{id}"))).await;
    assert!(body["image"].get("data_url").is_none());

    let calls = chat.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.model == "gpt-4o"));
    assert!(calls.iter().all(|c| c.request.has_image()));
}

#[tokio::test]
async fn text_only_chat_uses_text_model() {
    let chat = Arc::new(MockChat::new().reply("Hello!"));
    let (app, _) = app(chat.clone());
    let id = new_session(&app).await;
    let (status, body) = send(
        &app,
        post_json(&format!("/api/sessions/{id}/chat"), json!({"text": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Hello!");
    assert_eq!(chat.calls()[0].model, "gpt-4o-mini");
}

#[tokio::test]
async fn model_failure_becomes_reply() {
    let chat = Arc::new(MockChat::new().fail("quota exceeded"));
    let (app, _) = app(chat);
    let id = new_session(&app).await;
    let (status, body) = send(
        &app,
        post_json(&format!("/api/sessions/{id}/chat"), json!({"text": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reply = body["reply"].as_str().unwrap();
    assert!(reply.starts_with("Error:"));
    assert!(reply.contains("quota exceeded"));
    assert_eq!(body["session"]["transcript"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn blank_inputs_are_rejected() {
    let chat = Arc::new(MockChat::new());
    let (app, _) = app(chat.clone());
    let id = new_session(&app).await;
    let (status, _) = send(
        &app,
        post_json(&format!("/api/sessions/{id}/chat"), json!({"text": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        post_json(&format!("/api/sessions/{id}/objects"), json!({"name": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, upload(&format!("/api/sessions/{id}/image"), &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(chat.calls().is_empty());
}

#[tokio::test]
async fn objects_reach_the_system_prompt() {
    let chat = Arc::new(MockChat::new());
    let (app, _) = app(chat.clone());
    let id = new_session(&app).await;
    let uri = format!("/api/sessions/{id}/objects");
    send(&app, post_json(&uri, json!({"name": " apple "}))).await;
    let (status, body) = send(&app, post_json(&uri, json!({"name": "banana"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["objects"], json!([" apple ", "banana"]));

    send(
        &app,
        post_json(&format!("/api/sessions/{id}/chat"), json!({"text": "what is here?"})),
    )
    .await;
    let system = chat.calls()[0].request.system().to_string();
    assert!(system.contains("apple"));
    assert!(system.contains("banana"));

    let (status, body) = send(&app, bare("DELETE", &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["objects"], json!([]));
}

#[tokio::test]
async fn new_image_and_reset_clear_transcript() {
    let chat = Arc::new(MockChat::new().reply("q1").reply("a1").reply("q2"));
    let (app, _) = app(chat);
    let id = new_session(&app).await;
    let image = format!("/api/sessions/{id}/image");
    send(&app, upload(&image, PNG)).await;
    send(
        &app,
        post_json(&format!("/api/sessions/{id}/chat"), json!({"text": "x"})),
    )
    .await;
    let (_, body) = send(&app, upload(&image, PNG)).await;
    assert_eq!(
        body["session"]["transcript"],
        json!([{"role": "assistant", "content": "q2"}])
    );

    let (status, body) = send(&app, bare("POST", &format!("/api/sessions/{id}/reset"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcript"], json!([]));
    assert!(body["image"].is_object());
}

#[tokio::test]
async fn oversized_image_is_refused() {
    let config = TutorConfig {
        max_image_bytes: 8,
        ..TutorConfig::default()
    };
    let chat = Arc::new(MockChat::new());
    let (app, _) = app_with(chat.clone(), config);
    let id = new_session(&app).await;
    let (status, _) = send(&app, upload(&format!("/api/sessions/{id}/image"), PNG)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(chat.calls().is_empty());
}

#[tokio::test]
async fn ending_a_session_forgets_it() {
    let (app, state) = app(Arc::new(MockChat::new()));
    let id = new_session(&app).await;
    let uri = format!("/api/sessions/{id}");
    let (status, _) = send(&app, bare("DELETE", &uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, bare("GET", &uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(state.sessions.is_empty().await);
}
