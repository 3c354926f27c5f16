//! Attendance record handlers (admin channel).
//!
//! - `GET /api/v1/exports` - CSV export of one session or all records
//! - `POST /api/v1/attendance/present` - Mark a participant present
//! - `POST /api/v1/attendance/excused` - Mark a participant excused
//! - `POST /api/v1/attendance/remove` - Remove a participant's records

use crate::errors::RollCallError;
use crate::models::{CorrectionRequest, ExportQuery};
use crate::repositories::AttendanceStatus;
use crate::routes::AppState;
use crate::services::attendance::{parse_date, CorrectionOutcome, RemovalOutcome};
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Header carrying the number of exported rows.
pub const RECORD_COUNT_HEADER: &str = "x-record-count";

/// Handler for GET /api/v1/exports
///
/// Responds with `text/csv`; the file is also written to the export directory.
#[instrument(skip_all, name = "rc.records.export")]
pub async fn export_attendance(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, RollCallError> {
    let summary = state
        .service
        .export(query.channel_id, query.session_id.as_deref())
        .await?;

    let disposition = format!("attachment; filename=\"{}\"", summary.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (
                header::HeaderName::from_static(RECORD_COUNT_HEADER),
                summary.row_count.to_string(),
            ),
        ],
        summary.contents,
    )
        .into_response())
}

async fn set_status(
    state: &AppState,
    req: CorrectionRequest,
    status: AttendanceStatus,
) -> Result<Json<CorrectionOutcome>, RollCallError> {
    let date = parse_date(req.date.as_deref())?;
    let outcome = state
        .service
        .set_status(req.channel_id, &req.participant, status, date, req.session_id)
        .await?;
    Ok(Json(outcome))
}

/// Handler for POST /api/v1/attendance/present
#[instrument(skip_all, name = "rc.records.mark_present")]
pub async fn mark_present(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CorrectionRequest>,
) -> Result<Json<CorrectionOutcome>, RollCallError> {
    set_status(&state, req, AttendanceStatus::Present).await
}

/// Handler for POST /api/v1/attendance/excused
#[instrument(skip_all, name = "rc.records.mark_excused")]
pub async fn mark_excused(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CorrectionRequest>,
) -> Result<Json<CorrectionOutcome>, RollCallError> {
    set_status(&state, req, AttendanceStatus::Excused).await
}

/// Handler for POST /api/v1/attendance/remove
///
/// Requires a date or a session id; removing never defaults to today.
#[instrument(skip_all, name = "rc.records.remove")]
pub async fn remove_attendance(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CorrectionRequest>,
) -> Result<Json<RemovalOutcome>, RollCallError> {
    let date = match req.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => Some(parse_date(Some(raw))?),
        None => None,
    };
    let outcome = state
        .service
        .remove(req.channel_id, &req.participant, date, req.session_id)
        .await?;
    Ok(Json(outcome))
}
