//! Participant-facing handlers.
//!
//! - `POST /api/v1/submissions` - Submit the current code (attendance channel)
//! - `POST /api/v1/participants` - Register an external id and name

use crate::actors::messages::SubmissionReceipt;
use crate::errors::RollCallError;
use crate::models::{RegisterRequest, RegisterResponse, SubmitRequest};
use crate::routes::AppState;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /api/v1/submissions
#[instrument(
    skip_all,
    name = "rc.submission.submit",
    fields(method = "POST", endpoint = "/api/v1/submissions")
)]
pub async fn submit_attendance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmissionReceipt>, RollCallError> {
    let label = req
        .label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(&req.participant_id);

    let receipt = state
        .service
        .submit(req.channel_id, &req.participant_id, label, &req.code)
        .await?;
    Ok(Json(receipt))
}

/// Handler for POST /api/v1/participants
#[instrument(
    skip_all,
    name = "rc.participant.register",
    fields(method = "POST", endpoint = "/api/v1/participants")
)]
pub async fn register_participant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, RollCallError> {
    let outcome = state
        .service
        .register(
            &req.participant_id,
            &req.username,
            &req.external_id,
            req.display_name.as_deref(),
        )
        .await?;

    Ok(Json(RegisterResponse {
        participant_id: req.participant_id,
        outcome,
    }))
}
