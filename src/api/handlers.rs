//! HTTP request handlers

use super::sse::{purchase_stream, turn_stream};
use super::types::{
    ChatListResponse, CreateChatResponse, DisplayResponse, ErrorResponse, MessageRequest,
};
use super::AppState;
use crate::conversation::LogError;
use crate::runtime::{DispatchError, Identity, PersistenceError, PurchaseOrder, SessionContext};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;

/// Header carrying the caller's user id
pub const USER_HEADER: &str = "x-user-id";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/:id", delete(delete_chat))
        .route("/api/chats/:id/ui", get(get_display_state))
        .route("/api/chats/:id/messages", post(submit_message))
        .route("/api/chats/:id/purchase", post(confirm_purchase))
        .route("/version", get(get_version))
        .with_state(state)
}

/// Identity from the request header; absent or blank means anonymous
fn identity(headers: &HeaderMap) -> Option<Identity> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Identity::new)
}

async fn session(
    state: &AppState,
    headers: &HeaderMap,
    id: &str,
) -> Result<Arc<SessionContext>, AppError> {
    state
        .registry
        .get_or_restore(identity(headers), id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Chat not found: {id}")))
}

// ============================================================
// Chats
// ============================================================

async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<CreateChatResponse> {
    let session = state.registry.create(identity(&headers)).await;
    Json(CreateChatResponse {
        chat_id: session.session_id().to_string(),
    })
}

async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChatListResponse>, AppError> {
    let user = identity(&headers).ok_or(AppError::Unauthorized)?;
    let chats = state.registry.store().list_chats(&user.user_id).await?;
    Ok(Json(ChatListResponse { chats }))
}

async fn delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let user = identity(&headers).ok_or(AppError::Unauthorized)?;
    if state.registry.delete(&user, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Chat not found: {id}")))
    }
}

async fn get_display_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DisplayResponse>, AppError> {
    let session = session(&state, &headers, &id).await?;
    let display = session.on_resume_display_state().await?;
    Ok(Json(DisplayResponse { display }))
}

// ============================================================
// Actions
// ============================================================

async fn submit_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<Response, AppError> {
    let session = session(&state, &headers, &id).await?;
    let reply = state.dispatcher.submit_user_message(&session, &req.content)?;
    Ok(turn_stream(reply.id, reply.display).into_response())
}

async fn confirm_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(order): Json<PurchaseOrder>,
) -> Result<Response, AppError> {
    let session = session(&state, &headers, &id).await?;
    let reply = state.dispatcher.confirm_purchase(&session, order)?;
    Ok(purchase_stream(
        reply.new_message.id,
        reply.purchasing_ui,
        reply.new_message.display,
    )
    .into_response())
}

async fn get_version() -> &'static str {
    concat!("menubot ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::EmptyMessage | DispatchError::InvalidOrder(_) => {
                AppError::BadRequest(e.to_string())
            }
            DispatchError::Log(LogError::TurnInProgress) => AppError::Conflict(e.to_string()),
            DispatchError::Log(other) => AppError::Internal(other.to_string()),
        }
    }
}

impl From<PersistenceError> for AppError {
    fn from(e: PersistenceError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                format!("Missing {USER_HEADER} header"),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
