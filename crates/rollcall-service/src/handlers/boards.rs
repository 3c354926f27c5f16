//! Board handler.
//!
//! `GET /api/v1/boards/{channel_id}` returns the messages currently posted
//! on a display channel, for a projector page to poll.

use crate::errors::RollCallError;
use crate::models::BoardResponse;
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

/// Handler for GET /api/v1/boards/{channel_id}
pub async fn get_board(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<u64>,
) -> Result<Json<BoardResponse>, RollCallError> {
    let board = state
        .board
        .as_ref()
        .ok_or_else(|| RollCallError::NotFound("No board is served by this instance".to_string()))?;

    Ok(Json(BoardResponse {
        channel_id,
        messages: board.channel(channel_id).await,
    }))
}
