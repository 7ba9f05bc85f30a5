//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ContactRequest, CreateRoomRequest, CreateRoomResponse, ErrorResponse, HandCheckResponse,
    HandRequest, LockRequest, MessagesResponse, ParticipantRequestBody, RoomResponse,
    SendMessageRequest, SuccessResponse, TurnResponse,
};
use super::AppState;
use crate::db::{normalize_identifier, Contact};
use crate::runtime::{ConversationError, RoomError, RoomLifecycleError, TurnOutcome};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Room creation
        .route("/api/rooms", post(create_room))
        // Room retrieval
        .route("/api/rooms/:id", get(get_room))
        .route("/api/rooms/:id/messages", get(get_messages).post(send_message))
        // SSE streaming
        .route("/api/rooms/:id/stream", get(stream_room))
        // Forming
        .route("/api/rooms/:id/here", post(signal_here))
        .route("/api/rooms/:id/cancel", post(cancel_room))
        .route("/api/rooms/:id/expire", post(expire_room))
        .route("/api/rooms/:id/lock", post(lock_room))
        // Turns
        .route("/api/rooms/:id/pass", post(pass_turn))
        .route("/api/rooms/:id/yield", post(yield_turn))
        .route("/api/rooms/:id/hand", post(set_hand))
        .route("/api/rooms/:id/hand-check", post(hand_check))
        // Contact directory
        .route("/api/contacts", post(upsert_contact))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Rooms
// ============================================================

async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), AppError> {
    let participants = req.participants.into_iter().map(Into::into).collect();
    let room_id = state
        .rooms
        .create_room(&state.local_user_id, participants, req.tier)
        .await?;

    // The room exists even when creation fails; report the failure with it
    let error = match state.rooms.start(&room_id).await {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(room_id = %room_id, error = %e, "Room creation failed");
            Some(e.to_string())
        }
    };

    let room = state.rooms.snapshot(&room_id).await?;
    Ok((StatusCode::CREATED, Json(CreateRoomResponse { room, error })))
}

async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomResponse>, AppError> {
    let room = state.rooms.snapshot(&id).await?;
    Ok(Json(RoomResponse { room }))
}

async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessagesResponse>, AppError> {
    let messages = state.rooms.messages(&id).await?;
    Ok(Json(MessagesResponse { messages }))
}

async fn stream_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (room, messages, updates) = state.rooms.subscribe(&id).await?;
    Ok(sse_stream(room, messages, updates))
}

async fn signal_here(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ParticipantRequestBody>,
) -> Result<Json<RoomResponse>, AppError> {
    state.rooms.signal_here(&id, &req.participant_id).await?;
    room_response(&state, &id).await
}

async fn cancel_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomResponse>, AppError> {
    state.rooms.cancel(&id).await?;
    room_response(&state, &id).await
}

async fn expire_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomResponse>, AppError> {
    state.rooms.expire(&id).await?;
    room_response(&state, &id).await
}

async fn lock_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<LockRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    state.rooms.lock(&id, &req.cenotaph).await?;
    room_response(&state, &id).await
}

async fn room_response(state: &AppState, id: &str) -> Result<Json<RoomResponse>, AppError> {
    let room = state.rooms.snapshot(id).await?;
    Ok(Json(RoomResponse { room }))
}

// ============================================================
// Turns
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }
    let outcome = state.rooms.send_message(&id, &req.author_id, &req.text).await?;
    turn_response(&state, &id, outcome).await
}

async fn pass_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ParticipantRequestBody>,
) -> Result<Json<TurnResponse>, AppError> {
    let outcome = state.rooms.pass(&id, &req.participant_id).await?;
    turn_response(&state, &id, outcome).await
}

async fn yield_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ParticipantRequestBody>,
) -> Result<Json<TurnResponse>, AppError> {
    let outcome = state.rooms.human_yield(&id, &req.participant_id).await?;
    turn_response(&state, &id, outcome).await
}

async fn turn_response(
    state: &AppState,
    id: &str,
    outcome: Option<TurnOutcome>,
) -> Result<Json<TurnResponse>, AppError> {
    let room = state.rooms.snapshot(id).await?;
    Ok(Json(TurnResponse { room, outcome }))
}

async fn set_hand(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<HandRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    state.rooms.set_hand(&id, &req.participant_id, req.raised).await?;
    room_response(&state, &id).await
}

async fn hand_check(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HandCheckResponse>, AppError> {
    let raised = state.rooms.hand_raise_check(&id).await?;
    Ok(Json(HandCheckResponse { raised }))
}

// ============================================================
// Contacts
// ============================================================

async fn upsert_contact(
    State(state): State<AppState>,
    Json(req): Json<ContactRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let identifier = normalize_identifier(req.kind, &req.identifier);
    if identifier.is_empty() {
        return Err(AppError::BadRequest("Identifier is empty".to_string()));
    }

    state
        .db
        .upsert_contact(&Contact {
            kind: req.kind,
            identifier,
            user_id: req.user_id,
            discoverable: req.discoverable,
        })
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(SuccessResponse::ok()))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("lightward-rooms ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// Payment or completion backend failed
    Upstream(String),
    Internal(String),
}

impl From<RoomError> for AppError {
    fn from(e: RoomError) -> Self {
        let message = e.to_string();
        match e {
            RoomError::InvalidSpec(_) => AppError::BadRequest(message),
            RoomError::NotFound(_) => AppError::NotFound(message),
            RoomError::WrongPhase(_) => AppError::Conflict(message),
            RoomError::Lifecycle(e) => match e {
                RoomLifecycleError::Resolution { .. } | RoomLifecycleError::UnknownParticipant(_) => {
                    AppError::BadRequest(message)
                }
                RoomLifecycleError::Payment(_) => AppError::Upstream(message),
                RoomLifecycleError::LightwardDeclined
                | RoomLifecycleError::InvalidState { .. }
                | RoomLifecycleError::Conflict => AppError::Conflict(message),
                RoomLifecycleError::Store(_) => AppError::Internal(message),
            },
            RoomError::Conversation(e) => match e {
                ConversationError::UnknownParticipant(_) => AppError::BadRequest(message),
                ConversationError::NotActive(_)
                | ConversationError::NotYourTurn { .. }
                | ConversationError::NeedOutstanding
                | ConversationError::Conflict => AppError::Conflict(message),
                ConversationError::Completion(_) => AppError::Upstream(message),
                ConversationError::Store(_) => AppError::Internal(message),
            },
            RoomError::Closed | RoomError::Store(_) => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
