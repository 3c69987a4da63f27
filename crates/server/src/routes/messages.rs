//! Message history endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use koinonia_shared::{Message, RoomId};

use crate::chat::history::HISTORY_FETCH_CAP;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub room: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

/// Recent messages for a room, ascending by creation time, capped at 100
pub async fn recent_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    if query.room.trim().is_empty() {
        return Err(ApiError::Validation("room must not be empty".to_string()));
    }

    let room = RoomId::from(query.room);
    let limit = query.limit.unwrap_or(HISTORY_FETCH_CAP);
    let messages = state.history.recent(&room, limit).await?;

    Ok(Json(MessagesResponse { messages }))
}
