use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::error;

use vellum_relay::RelayError;
use vellum_types::{MessageId, RoomId};
use vellum_types::api::{MessageResponse, SendMessageRequest};
use vellum_types::models::{HistoryCursor, SealedMessage};

use crate::AppState;
use crate::middleware::Caller;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Pass the `created_at` and `id` of the oldest message from the
    /// previous page to fetch older messages.
    pub before: Option<DateTime<Utc>>,
    pub before_id: Option<MessageId>,
}

impl MessageQuery {
    /// `before_id` only makes sense alongside `before`.
    fn cursor(&self) -> Result<Option<HistoryCursor>, StatusCode> {
        match (self.before, self.before_id) {
            (Some(timestamp), id) => Ok(Some(HistoryCursor { timestamp, id })),
            (None, Some(_)) => Err(StatusCode::BAD_REQUEST),
            (None, None) => Ok(None),
        }
    }
}

fn default_limit() -> u32 {
    50
}

fn to_response(message: &SealedMessage) -> MessageResponse {
    MessageResponse {
        id: message.id,
        room_id: message.room_id,
        sender_id: message.sender_id,
        envelopes: message.envelopes.clone(),
        created_at: message.timestamp,
    }
}

fn relay_status(e: RelayError) -> StatusCode {
    match e {
        RelayError::NoRecipients | RelayError::InvalidEnvelope { .. } => StatusCode::BAD_REQUEST,
        RelayError::Storage(e) => {
            error!("relay storage error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Post a message already sealed by the sender. The server never sees
/// the plaintext.
pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Extension(Caller(sender_id)): Extension<Caller>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = state
        .relay
        .publish(room_id, req.envelopes, sender_id, Utc::now())
        .await
        .map_err(relay_status)?;

    Ok((StatusCode::CREATED, Json(to_response(&message))))
}

/// The caller's history for a room, newest first. Each message carries only
/// the caller's own envelope.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Extension(Caller(caller)): Extension<Caller>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.min(state.history_limit).max(1);
    let cursor = query.cursor()?;

    let messages = state
        .relay
        .history(room_id, caller, limit, cursor)
        .await
        .map_err(relay_status)?;

    Ok(Json(messages.iter().map(to_response).collect::<Vec<_>>()))
}
