//! Attendance service.
//!
//! Drives the coordinator from the command surface: applies the channel
//! policy, posts and refreshes session boards, persists the finalized record
//! on close and handles operator corrections.
//!
//! Display and database I/O always happens here, after the coordinator has
//! answered, never inside it.

use crate::actors::coordinator::SessionCoordinatorHandle;
use crate::actors::messages::{
    EndedSession, SessionStatus, StartedSession, SubmissionReceipt, SurfaceHandles,
};
use crate::code::CodeGenerator;
use crate::config::Config;
use crate::display::{BoardContent, DisplayError, DisplaySurface, MessageRef};
use crate::errors::{RollCallError, SessionError};
use crate::observability::metrics;
use crate::repositories::attendance::{self as attendance_repo, ManualRecord, RecordFilter};
use crate::repositories::participants::{self as participants_repo, Participant};
use crate::repositories::{AttendanceStatus, RegistrationOutcome};
use crate::services::export::{self, ExportSummary};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Outcome of closing a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedSession {
    pub session_id: String,
    /// Distinct participants recorded.
    pub total: usize,
    /// Rows written to the database.
    pub saved: u64,
}

/// Outcome of a mark-present or excuse correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionOutcome {
    pub participant_id: String,
    pub name: String,
    pub status: AttendanceStatus,
    pub session_id: String,
    /// Status before the correction, when a record already existed.
    pub previous_status: Option<AttendanceStatus>,
}

/// Outcome of removing records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalOutcome {
    pub participant_id: String,
    pub name: String,
    pub removed: u64,
}

/// Parse an optional `YYYY-MM-DD` date, defaulting to today (UTC).
///
/// # Errors
///
/// Returns `RollCallError::BadRequest` if the date is malformed.
pub fn parse_date(date: Option<&str>) -> Result<NaiveDate, RollCallError> {
    match date.map(str::trim).filter(|d| !d.is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            RollCallError::BadRequest(format!(
                "Invalid date format: {raw}. Use YYYY-MM-DD (e.g. 2025-12-01)"
            ))
        }),
        None => Ok(Utc::now().date_naive()),
    }
}

fn display_error(err: DisplayError) -> RollCallError {
    RollCallError::Display(err.to_string())
}

/// Persist an ended session exactly once and mark its boards closed.
async fn finish_close(
    pool: SqlitePool,
    display: Arc<dyn DisplaySurface>,
    ended: EndedSession,
) -> Result<ClosedSession, RollCallError> {
    let EndedSession {
        record,
        surfaces,
        rotation,
    } = ended;

    // Let an in-flight tick finish before the boards are finalized
    if let Some(rotation) = rotation {
        rotation.shutdown().await;
    }

    let total = record.entries.len();
    let start = Instant::now();
    let persisted = attendance_repo::save_records(&pool, &record).await;
    let duration = start.elapsed();

    retire_boards(
        display.as_ref(),
        &[surfaces.admin, surfaces.attendance],
        total,
    )
    .await;

    match persisted {
        Ok(saved) => {
            metrics::record_persistence("success", saved, duration);
            info!(
                target: "rc.service",
                session_id = %record.session_id,
                total,
                saved,
                "Attendance closed"
            );
            Ok(ClosedSession {
                session_id: record.session_id,
                total,
                saved,
            })
        }
        Err(e) => {
            metrics::record_persistence("error", 0, duration);
            error!(
                target: "rc.service",
                session_id = %record.session_id,
                lost = total,
                error = %e,
                "Failed to persist closed session; records not saved"
            );
            Err(RollCallError::PersistenceFailed {
                session_id: record.session_id,
                lost: total,
            })
        }
    }
}

/// Best-effort: mark boards closed. Failures are logged only.
async fn retire_boards(display: &dyn DisplaySurface, boards: &[MessageRef], total: usize) {
    for board in boards {
        match display.update(board, BoardContent::Closed { total }).await {
            Ok(()) => metrics::record_display_update("success"),
            Err(e) => {
                metrics::record_display_update(match e {
                    DisplayError::MessageNotFound => "not_found",
                    DisplayError::Unavailable(_) => "unavailable",
                });
                warn!(
                    target: "rc.service",
                    channel_id = board.channel_id,
                    message_id = board.message_id,
                    error = %e,
                    "Failed to mark board closed"
                );
            }
        }
    }
}

/// Orchestrates sessions, persistence and corrections.
pub struct AttendanceService {
    pool: SqlitePool,
    coordinator: SessionCoordinatorHandle,
    display: Arc<dyn DisplaySurface>,
    generator: CodeGenerator,
    admin_channel_id: u64,
    attendance_channel_id: u64,
    export_dir: PathBuf,
}

impl AttendanceService {
    pub fn new(
        pool: SqlitePool,
        coordinator: SessionCoordinatorHandle,
        display: Arc<dyn DisplaySurface>,
        config: &Config,
    ) -> Self {
        Self {
            pool,
            coordinator,
            display,
            generator: CodeGenerator::new(config.code_length),
            admin_channel_id: config.admin_channel_id,
            attendance_channel_id: config.attendance_channel_id,
            export_dir: config.export_dir.clone(),
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> &SessionCoordinatorHandle {
        &self.coordinator
    }

    fn require_admin(&self, channel_id: u64) -> Result<(), RollCallError> {
        if channel_id == self.admin_channel_id {
            Ok(())
        } else {
            Err(RollCallError::WrongChannel(
                "This command can only be used in the admin channel".to_string(),
            ))
        }
    }

    fn require_attendance(&self, channel_id: u64) -> Result<(), RollCallError> {
        if channel_id == self.attendance_channel_id {
            Ok(())
        } else {
            Err(RollCallError::WrongChannel(
                "This command can only be used in the attendance channel".to_string(),
            ))
        }
    }

    /// Open a session: post both boards, then start the coordinator.
    #[instrument(skip_all, fields(channel_id = channel_id))]
    pub async fn open(&self, channel_id: u64) -> Result<StartedSession, RollCallError> {
        self.require_admin(channel_id)?;

        // Avoid posting boards for a session that cannot start
        if self.coordinator.status().await?.is_active {
            return Err(SessionError::SessionAlreadyActive.into());
        }

        let code = self.generator.next(None)?;

        let admin = self
            .display
            .publish(
                self.admin_channel_id,
                BoardContent::Code {
                    code: code.to_string(),
                    submissions: 0,
                },
            )
            .await
            .map_err(display_error)?;

        let attendance = match self
            .display
            .publish(self.attendance_channel_id, BoardContent::Open)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                retire_boards(self.display.as_ref(), &[admin], 0).await;
                return Err(display_error(e));
            }
        };

        let surfaces = SurfaceHandles { admin, attendance };
        match self.coordinator.start(code, surfaces).await {
            Ok(started) => {
                info!(
                    target: "rc.service",
                    session_id = %started.session_id,
                    "Attendance opened"
                );
                Ok(started)
            }
            Err(e) => {
                // Lost a race with another open; its boards stay, ours go
                retire_boards(self.display.as_ref(), &[admin, attendance], 0).await;
                Err(e)
            }
        }
    }

    /// Close the active session and persist its record exactly once.
    ///
    /// # Errors
    ///
    /// `RollCallError::PersistenceFailed` if the record could not be stored.
    /// The session is closed either way and is never reopened.
    #[instrument(skip_all, fields(channel_id = channel_id))]
    pub async fn close(&self, channel_id: u64) -> Result<ClosedSession, RollCallError> {
        self.require_admin(channel_id)?;
        self.close_active().await
    }

    async fn close_active(&self) -> Result<ClosedSession, RollCallError> {
        let coordinator = self.coordinator.clone();
        let pool = self.pool.clone();
        let display = Arc::clone(&self.display);

        // Ending and saving run detached: a dropped request must not leave
        // a finalized record without an owner.
        let finish = tokio::spawn(async move {
            let ended = coordinator.end().await?;
            finish_close(pool, display, ended).await
        });
        finish
            .await
            .map_err(|e| RollCallError::Internal(format!("close task failed: {e}")))?
    }

    /// Snapshot of the session (admin only: it contains the live code).
    pub async fn status(&self, channel_id: u64) -> Result<SessionStatus, RollCallError> {
        self.require_admin(channel_id)?;
        self.coordinator.status().await
    }

    /// Record a participant's code submission.
    #[instrument(skip_all, fields(channel_id = channel_id, participant_id = %participant_id))]
    pub async fn submit(
        &self,
        channel_id: u64,
        participant_id: &str,
        label: &str,
        code: &str,
    ) -> Result<SubmissionReceipt, RollCallError> {
        if let Err(e) = self.require_attendance(channel_id) {
            metrics::record_submission("wrong_channel");
            return Err(e);
        }
        if participant_id.trim().is_empty() {
            return Err(RollCallError::BadRequest(
                "participant_id must not be empty".to_string(),
            ));
        }

        let result = self
            .coordinator
            .submit(participant_id.to_string(), label.to_string(), code)
            .await;
        metrics::record_submission(match &result {
            Ok(_) => "accepted",
            Err(RollCallError::Session(SessionError::InvalidCode)) => "invalid_code",
            Err(RollCallError::Session(SessionError::NoActiveSession)) => "no_session",
            Err(_) => "error",
        });
        result
    }

    /// Create or update a participant's registration.
    pub async fn register(
        &self,
        participant_id: &str,
        username: &str,
        external_id: &str,
        display_name: Option<&str>,
    ) -> Result<RegistrationOutcome, RollCallError> {
        let external_id = external_id.trim();
        if participant_id.trim().is_empty() || external_id.is_empty() {
            return Err(RollCallError::BadRequest(
                "participant_id and external_id are required".to_string(),
            ));
        }
        let display_name = display_name.map(str::trim).filter(|n| !n.is_empty());

        participants_repo::register(&self.pool, participant_id, username, external_id, display_name)
            .await
    }

    /// Export attendance as CSV (admin only).
    ///
    /// # Errors
    ///
    /// `RollCallError::NotFound` if there are no matching records.
    pub async fn export(
        &self,
        channel_id: u64,
        session_id: Option<&str>,
    ) -> Result<ExportSummary, RollCallError> {
        self.require_admin(channel_id)?;
        let session_id = session_id.map(str::trim).filter(|id| !id.is_empty());

        let summary = export::export_csv(&self.pool, &self.export_dir, session_id).await?;
        if summary.row_count == 0 {
            return Err(RollCallError::NotFound(
                "No records found to export".to_string(),
            ));
        }
        Ok(summary)
    }

    async fn resolve(&self, identifier: &str) -> Result<Participant, RollCallError> {
        participants_repo::find(&self.pool, identifier)
            .await?
            .ok_or_else(|| {
                RollCallError::NotFound(format!(
                    "Participant not found: {identifier}. Use their external id, username or participant id"
                ))
            })
    }

    /// Mark a participant present or excused (admin only).
    ///
    /// Updates a matching record if one exists, otherwise adds a manual one.
    #[instrument(skip_all, fields(channel_id = channel_id, status = status.as_db_str()))]
    pub async fn set_status(
        &self,
        channel_id: u64,
        identifier: &str,
        status: AttendanceStatus,
        date: NaiveDate,
        session_id: Option<String>,
    ) -> Result<CorrectionOutcome, RollCallError> {
        self.require_admin(channel_id)?;
        let participant = self.resolve(identifier).await?;
        let filter = RecordFilter::new(session_id.clone(), date);

        if let Some(existing) =
            attendance_repo::find_record(&self.pool, &participant.participant_id, &filter).await?
        {
            let updated = attendance_repo::update_status(
                &self.pool,
                &participant.participant_id,
                status,
                &filter,
            )
            .await?;
            if updated == 0 {
                return Err(RollCallError::Internal(
                    "attendance record vanished during update".to_string(),
                ));
            }
            info!(
                target: "rc.service",
                participant_id = %participant.participant_id,
                session_id = %existing.session_id,
                "Attendance status updated"
            );
            return Ok(CorrectionOutcome {
                name: participant.preferred_name().to_string(),
                participant_id: participant.participant_id,
                status,
                session_id: existing.session_id,
                previous_status: Some(existing.status),
            });
        }

        let record = attendance_repo::add_manual(
            &self.pool,
            &ManualRecord {
                participant_id: participant.participant_id.clone(),
                display_label: participant.username.clone(),
                date,
                session_id,
                status,
            },
        )
        .await?;
        info!(
            target: "rc.service",
            participant_id = %participant.participant_id,
            session_id = %record.session_id,
            "Manual attendance added"
        );

        Ok(CorrectionOutcome {
            name: participant.preferred_name().to_string(),
            participant_id: participant.participant_id,
            status,
            session_id: record.session_id,
            previous_status: None,
        })
    }

    /// Remove a participant's records for a session or date (admin only).
    #[instrument(skip_all, fields(channel_id = channel_id))]
    pub async fn remove(
        &self,
        channel_id: u64,
        identifier: &str,
        date: Option<NaiveDate>,
        session_id: Option<String>,
    ) -> Result<RemovalOutcome, RollCallError> {
        self.require_admin(channel_id)?;
        let filter = match (session_id.filter(|id| !id.trim().is_empty()), date) {
            (Some(id), _) => RecordFilter::Session(id),
            (None, Some(date)) => RecordFilter::Date(date),
            (None, None) => {
                return Err(RollCallError::BadRequest(
                    "Specify either a date or a session_id".to_string(),
                ))
            }
        };

        let participant = self.resolve(identifier).await?;
        if attendance_repo::find_record(&self.pool, &participant.participant_id, &filter)
            .await?
            .is_none()
        {
            return Err(RollCallError::NotFound(format!(
                "No attendance record found for {}",
                participant.preferred_name()
            )));
        }

        let removed =
            attendance_repo::remove_records(&self.pool, &participant.participant_id, &filter)
                .await?;
        info!(
            target: "rc.service",
            participant_id = %participant.participant_id,
            removed,
            "Attendance removed"
        );

        Ok(RemovalOutcome {
            name: participant.preferred_name().to_string(),
            participant_id: participant.participant_id,
            removed,
        })
    }

    /// Teardown: close an open session through the normal path, then stop
    /// the coordinator.
    pub async fn shutdown(&self) {
        match self.coordinator.status().await {
            Ok(status) if status.is_active => match self.close_active().await {
                Ok(closed) => info!(
                    target: "rc.service",
                    session_id = %closed.session_id,
                    saved = closed.saved,
                    "Open session closed during shutdown"
                ),
                Err(e) => error!(
                    target: "rc.service",
                    error = %e,
                    "Failed to close open session during shutdown"
                ),
            },
            Ok(_) => {}
            Err(e) => warn!(target: "rc.service", error = %e, "Coordinator unavailable at shutdown"),
        }
        self.coordinator.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(Some("2025-12-01")).unwrap(),
            NaiveDate::from_ymd_opt(2025, 12, 1).unwrap()
        );
        assert_eq!(parse_date(None).unwrap(), Utc::now().date_naive());
        assert_eq!(parse_date(Some("  ")).unwrap(), Utc::now().date_naive());
        assert!(matches!(
            parse_date(Some("12/01/2025")),
            Err(RollCallError::BadRequest(_))
        ));
        assert!(matches!(
            parse_date(Some("2025-02-30")),
            Err(RollCallError::BadRequest(_))
        ));
    }
}
