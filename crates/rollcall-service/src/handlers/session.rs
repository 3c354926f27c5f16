//! Session handlers.
//!
//! - `POST /api/v1/session/open` - Open a session (admin channel)
//! - `POST /api/v1/session/close` - Close the session and persist it (admin channel)
//! - `GET /api/v1/session` - Session snapshot (admin channel)

use crate::actors::messages::{SessionStatus, StartedSession};
use crate::errors::RollCallError;
use crate::models::{ChannelQuery, ChannelRequest};
use crate::routes::AppState;
use crate::services::attendance::ClosedSession;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /api/v1/session/open
///
/// Returns 201 with the session id and first code.
#[instrument(
    skip_all,
    name = "rc.session.open",
    fields(method = "POST", endpoint = "/api/v1/session/open")
)]
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChannelRequest>,
) -> Result<(StatusCode, Json<StartedSession>), RollCallError> {
    let started = state.service.open(req.channel_id).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// Handler for POST /api/v1/session/close
#[instrument(
    skip_all,
    name = "rc.session.close",
    fields(method = "POST", endpoint = "/api/v1/session/close")
)]
pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChannelRequest>,
) -> Result<Json<ClosedSession>, RollCallError> {
    let closed = state.service.close(req.channel_id).await?;
    Ok(Json(closed))
}

/// Handler for GET /api/v1/session
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChannelQuery>,
) -> Result<Json<SessionStatus>, RollCallError> {
    let status = state.service.status(query.channel_id).await?;
    Ok(Json(status))
}
