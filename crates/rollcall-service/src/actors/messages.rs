//! Coordinator mailbox messages and the data they carry.

use crate::actors::rotation::RotationHandle;
use crate::code::AttendanceCode;
use crate::display::MessageRef;
use crate::errors::RollCallError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

/// Where a session is being displayed.
///
/// Supplied by the caller at `start`; the coordinator stores and returns
/// these without interpreting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurfaceHandles {
    /// Operator-facing board that shows the live code.
    pub admin: MessageRef,
    /// Participant-facing notice (never shows the code).
    pub attendance: MessageRef,
}

/// A participant's latest accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionEntry {
    /// Stable participant identity from the command surface.
    pub participant_id: String,
    /// Display label at the time of submission.
    pub label: String,
    /// Code that was accepted.
    pub code: AttendanceCode,
    /// When the submission was accepted.
    pub accepted_at: DateTime<Utc>,
}

/// Immutable result of closing a session, handed off for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedRecord {
    pub session_id: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    /// One entry per participant, ordered by acceptance time.
    pub entries: Vec<SubmissionEntry>,
}

/// Returned by a successful `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedSession {
    pub session_id: String,
    pub code: AttendanceCode,
}

/// Returned by a successful `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub session_id: String,
    pub code: AttendanceCode,
    pub accepted_at: DateTime<Utc>,
}

/// Returned by a successful `end`.
///
/// The rotation handle comes back to the caller so it can wait for an
/// in-flight tick outside the coordinator before touching the display.
#[derive(Debug)]
pub struct EndedSession {
    pub record: FinalizedRecord,
    pub surfaces: SurfaceHandles,
    pub rotation: Option<RotationHandle>,
}

/// Consistent snapshot of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub is_active: bool,
    pub session_id: Option<String>,
    pub current_code: Option<AttendanceCode>,
    pub code_issued_at: Option<DateTime<Utc>>,
    pub submission_count: usize,
}

impl SessionStatus {
    /// Snapshot reported while no session is active.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            is_active: false,
            session_id: None,
            current_code: None,
            code_issued_at: None,
            submission_count: 0,
        }
    }
}

/// Messages handled by the `SessionCoordinator` actor.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// Open a new session.
    Start {
        initial_code: AttendanceCode,
        surfaces: SurfaceHandles,
        respond_to: oneshot::Sender<Result<StartedSession, RollCallError>>,
    },

    /// Record a participant's submission.
    Submit {
        participant_id: String,
        label: String,
        code: AttendanceCode,
        respond_to: oneshot::Sender<Result<SubmissionReceipt, RollCallError>>,
    },

    /// Publish a new code. `session_id` fences updates from a rotation task
    /// to the session that spawned it; `None` applies to whichever session
    /// is active. Responds with the post-update snapshot, or `None` when the
    /// update was dropped.
    UpdateCode {
        session_id: Option<String>,
        code: AttendanceCode,
        respond_to: oneshot::Sender<Option<SessionStatus>>,
    },

    /// Close the active session.
    End {
        respond_to: oneshot::Sender<Result<EndedSession, RollCallError>>,
    },

    /// Read-only snapshot.
    Status {
        respond_to: oneshot::Sender<SessionStatus>,
    },
}
