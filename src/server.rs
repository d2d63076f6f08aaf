use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use lesson::{LessonImage, SessionSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::avatar_socket;
use crate::page;
use crate::state::{AppState, SharedSession};

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("{0}")]
    BadRequest(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        debug!(%status, error = %self, "request rejected");
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

/// A model reply together with the session it changed.
#[derive(Debug, Serialize)]
pub struct Exchange {
    pub reply: String,
    pub session: SessionSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct ChatInput {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectInput {
    pub name: String,
}

/// Build the router serving the page, the session API and the avatar socket.
pub fn router(state: Arc<AppState>) -> Router {
    let image_limit = DefaultBodyLimit::max(state.max_image_bytes);
    Router::new()
        .route("/", get(index))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(show_session).delete(end_session))
        .route("/api/sessions/:id/image", post(upload_image).layer(image_limit))
        .route(
            "/api/sessions/:id/objects",
            post(add_object).delete(clear_objects),
        )
        .route("/api/sessions/:id/chat", post(chat))
        .route("/api/sessions/:id/reset", post(reset))
        .route("/api/sessions/:id/avatar", get(avatar))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl+C or SIGTERM.
pub async fn run_server(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "serving tutor");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Waits for either `Ctrl+C` or `SIGTERM` (on Unix).
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown signal received");
}

async fn lookup(state: &AppState, id: Uuid) -> Result<SharedSession, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or(AppError::SessionNotFound(id))
}

async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let (_, session) = state.sessions.create().await;
    let snapshot = session.lock().await.snapshot_with_image();
    Ok(Html(page::render(&snapshot)?))
}

async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SessionSnapshot>) {
    let (_, session) = state.sessions.create().await;
    let snapshot = session.lock().await.snapshot();
    (StatusCode::CREATED, Json(snapshot))
}

async fn show_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = lookup(&state, id).await?;
    let snapshot = session.lock().await.snapshot();
    Ok(Json(snapshot))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::SessionNotFound(id))
    }
}

/// Replace the session image with the raw request body and open a lesson on it.
async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Exchange>, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("image must not be empty"));
    }
    let session = lookup(&state, id).await?;
    let mime = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::trim);
    let name = headers
        .get("x-file-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("upload");
    let image = LessonImage::new(name, mime, body.to_vec());
    info!(session = %id, name, mime = image.mime(), bytes = image.len(), "image uploaded");

    let mut session = session.lock().await;
    session.load_image(image);
    let reply = state.tutor.open_lesson(&mut session).await.content.clone();
    Ok(Json(Exchange {
        reply,
        session: session.snapshot_with_image(),
    }))
}

async fn add_object(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<ObjectInput>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = lookup(&state, id).await?;
    let mut session = session.lock().await;
    if !session.add_object(&input.name) {
        return Err(AppError::BadRequest("object name must not be blank"));
    }
    Ok(Json(session.snapshot()))
}

async fn clear_objects(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = lookup(&state, id).await?;
    let mut session = session.lock().await;
    session.clear_objects();
    Ok(Json(session.snapshot()))
}

/// Record the learner's message and answer it.
async fn chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<ChatInput>,
) -> Result<Json<Exchange>, AppError> {
    let text = input.text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("message must not be blank"));
    }
    let session = lookup(&state, id).await?;
    let mut session = session.lock().await;
    let reply = state.tutor.respond(&mut session, text).await.content.clone();
    Ok(Json(Exchange {
        reply,
        session: session.snapshot(),
    }))
}

async fn reset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = lookup(&state, id).await?;
    let mut session = session.lock().await;
    session.reset();
    Ok(Json(session.snapshot()))
}

async fn avatar(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    lookup(&state, id).await?;
    Ok(ws.on_upgrade(move |socket| avatar_socket::run(state, id, socket)))
}
