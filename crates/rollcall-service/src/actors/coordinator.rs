//! `SessionCoordinator` - owns the attendance session state machine.
//!
//! States are `Inactive` and `Active`. Every state-changing operation is a
//! mailbox message processed by a single task, so submissions, rotation
//! ticks and `end` are serialized without any lock. None of the handlers
//! perform I/O; display updates and persistence happen in the caller after
//! the in-memory transition completes.
//!
//! While a session is active the coordinator owns its rotation task. The
//! task reaches back through a weak mailbox sender and tags each update with
//! the session id it was spawned for, so a late tick can never change a
//! session it does not belong to.

use crate::actors::ledger::SubmissionLedger;
use crate::actors::messages::{
    CoordinatorMessage, EndedSession, FinalizedRecord, SessionStatus, StartedSession,
    SubmissionEntry, SubmissionReceipt, SurfaceHandles,
};
use crate::actors::rotation::{RotationHandle, RotationScheduler};
use crate::code::{AttendanceCode, CodeGenerator};
use crate::display::{BoardContent, DisplayError, DisplaySurface, MessageRef};
use crate::errors::{RollCallError, SessionError};
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Mailbox capacity. Submissions from a full room arrive in bursts.
const COORDINATOR_CHANNEL_BUFFER: usize = 1024;

/// Cloneable handle to the `SessionCoordinator` actor.
#[derive(Clone, Debug)]
pub struct SessionCoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    cancel_token: CancellationToken,
}

impl SessionCoordinatorHandle {
    /// Open a session with `initial_code`, displayed on `surfaces`.
    ///
    /// # Errors
    ///
    /// - `SessionError::SessionAlreadyActive` if a session is open
    /// - `RollCallError::BadRequest` if the code is empty
    pub async fn start(
        &self,
        initial_code: AttendanceCode,
        surfaces: SurfaceHandles,
    ) -> Result<StartedSession, RollCallError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorMessage::Start {
            initial_code,
            surfaces,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Submit a code on behalf of a participant.
    ///
    /// The raw input is normalized before comparison.
    ///
    /// # Errors
    ///
    /// - `SessionError::NoActiveSession` if no session is open
    /// - `SessionError::InvalidCode` if the code is not the current one
    pub async fn submit(
        &self,
        participant_id: String,
        label: String,
        code: &str,
    ) -> Result<SubmissionReceipt, RollCallError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorMessage::Submit {
            participant_id,
            label,
            code: AttendanceCode::normalize(code),
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Publish a new code for whichever session is active.
    ///
    /// Returns the snapshot after the update, or `None` if it was ignored
    /// (no active session, empty code, or same as the current code).
    pub async fn update_code(
        &self,
        code: AttendanceCode,
    ) -> Result<Option<SessionStatus>, RollCallError> {
        self.update_code_for(None, code).await
    }

    async fn update_code_for(
        &self,
        session_id: Option<String>,
        code: AttendanceCode,
    ) -> Result<Option<SessionStatus>, RollCallError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorMessage::UpdateCode {
            session_id,
            code,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await
    }

    /// Close the active session and take its finalized record.
    ///
    /// Rotation is cancelled before this returns; the returned handle lets
    /// the caller wait for a tick that was already running.
    ///
    /// # Errors
    ///
    /// - `SessionError::NoActiveSession` if no session is open
    pub async fn end(&self) -> Result<EndedSession, RollCallError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorMessage::End { respond_to: tx }).await?;
        Self::receive(rx).await?
    }

    /// Consistent snapshot of the coordinator.
    pub async fn status(&self) -> Result<SessionStatus, RollCallError> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorMessage::Status { respond_to: tx })
            .await?;
        Self::receive(rx).await
    }

    /// Cancel the coordinator (and any running rotation).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: CoordinatorMessage) -> Result<(), RollCallError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| RollCallError::Internal(format!("channel send failed: {e}")))
    }

    async fn receive<T>(rx: oneshot::Receiver<T>) -> Result<T, RollCallError> {
        rx.await
            .map_err(|e| RollCallError::Internal(format!("response receive failed: {e}")))
    }
}

/// The open session. Replaced as a whole on `start` and `end`.
#[derive(Debug)]
struct Session {
    id: String,
    opened_at: DateTime<Utc>,
    code: AttendanceCode,
    code_issued_at: DateTime<Utc>,
    surfaces: SurfaceHandles,
    ledger: SubmissionLedger,
    rotation: Option<RotationHandle>,
}

impl Session {
    fn status(&self) -> SessionStatus {
        SessionStatus {
            is_active: true,
            session_id: Some(self.id.clone()),
            current_code: Some(self.code.clone()),
            code_issued_at: Some(self.code_issued_at),
            submission_count: self.ledger.count(),
        }
    }
}

#[derive(Debug, Default)]
enum SessionState {
    #[default]
    Inactive,
    Active(Session),
}

/// The `SessionCoordinator` actor.
pub struct SessionCoordinator {
    receiver: mpsc::Receiver<CoordinatorMessage>,
    /// Given to rotation tasks; never keeps the actor alive.
    mailbox: mpsc::WeakSender<CoordinatorMessage>,
    cancel_token: CancellationToken,
    state: SessionState,
    generator: CodeGenerator,
    display: Arc<dyn DisplaySurface>,
    rotation_interval: Duration,
    /// Per-process suffix that keeps session ids unique within one second.
    session_seq: u64,
}

impl SessionCoordinator {
    /// Spawn the coordinator actor.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `generator` - Source of rotated codes
    /// * `display` - Surface refreshed on every rotation
    /// * `rotation_interval` - Time between code rotations
    /// * `cancel_token` - Cancellation token; rotation tasks use child tokens
    pub fn spawn(
        generator: CodeGenerator,
        display: Arc<dyn DisplaySurface>,
        rotation_interval: Duration,
        cancel_token: CancellationToken,
    ) -> (SessionCoordinatorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(COORDINATOR_CHANNEL_BUFFER);

        let actor = Self {
            receiver,
            mailbox: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            state: SessionState::Inactive,
            generator,
            display,
            rotation_interval,
            session_seq: 0,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionCoordinatorHandle {
            sender,
            cancel_token,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "rc.actor.coordinator")]
    async fn run(mut self) {
        info!(target: "rc.actor.coordinator", "SessionCoordinator started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rc.actor.coordinator",
                        "SessionCoordinator received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(
                                target: "rc.actor.coordinator",
                                "SessionCoordinator channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        if let SessionState::Active(session) = std::mem::take(&mut self.state) {
            if let Some(rotation) = &session.rotation {
                rotation.cancel();
            }
            metrics::set_session_active(false);
            warn!(
                target: "rc.actor.coordinator",
                session_id = %session.id,
                submissions = session.ledger.count(),
                "SessionCoordinator stopped with an open session; submissions discarded"
            );
        }

        info!(target: "rc.actor.coordinator", "SessionCoordinator stopped");
    }

    fn handle_message(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::Start {
                initial_code,
                surfaces,
                respond_to,
            } => {
                let result = self.handle_start(initial_code, surfaces);
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::Submit {
                participant_id,
                label,
                code,
                respond_to,
            } => {
                let result = self.handle_submit(participant_id, label, code);
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::UpdateCode {
                session_id,
                code,
                respond_to,
            } => {
                let result = self.handle_update_code(session_id.as_deref(), code);
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::End { respond_to } => {
                let result = self.handle_end();
                if let Err(Ok(ended)) = respond_to.send(result) {
                    error!(
                        target: "rc.actor.coordinator",
                        session_id = %ended.record.session_id,
                        lost = ended.record.entries.len(),
                        "End caller went away; finalized record dropped"
                    );
                }
            }

            CoordinatorMessage::Status { respond_to } => {
                let status = match &self.state {
                    SessionState::Active(session) => session.status(),
                    SessionState::Inactive => SessionStatus::inactive(),
                };
                let _ = respond_to.send(status);
            }
        }
    }

    fn handle_start(
        &mut self,
        initial_code: AttendanceCode,
        surfaces: SurfaceHandles,
    ) -> Result<StartedSession, RollCallError> {
        if let SessionState::Active(session) = &self.state {
            debug!(
                target: "rc.actor.coordinator",
                session_id = %session.id,
                "Start rejected: session already active"
            );
            return Err(SessionError::SessionAlreadyActive.into());
        }
        if initial_code.is_empty() {
            return Err(RollCallError::BadRequest(
                "Initial code must not be empty".to_string(),
            ));
        }

        let opened_at = Utc::now();
        self.session_seq += 1;
        let session_id = format!("{}-{}", opened_at.format("%Y%m%d_%H%M%S"), self.session_seq);

        let rotation = self.spawn_rotation(&session_id, surfaces.admin);

        self.state = SessionState::Active(Session {
            id: session_id.clone(),
            opened_at,
            code: initial_code.clone(),
            code_issued_at: opened_at,
            surfaces,
            ledger: SubmissionLedger::new(),
            rotation: Some(rotation),
        });
        metrics::set_session_active(true);

        info!(
            target: "rc.actor.coordinator",
            session_id = %session_id,
            "Attendance session started"
        );

        Ok(StartedSession {
            session_id,
            code: initial_code,
        })
    }

    fn handle_submit(
        &mut self,
        participant_id: String,
        label: String,
        code: AttendanceCode,
    ) -> Result<SubmissionReceipt, RollCallError> {
        let SessionState::Active(session) = &mut self.state else {
            return Err(SessionError::NoActiveSession.into());
        };

        if code.is_empty() || code != session.code {
            debug!(
                target: "rc.actor.coordinator",
                session_id = %session.id,
                participant_id = %participant_id,
                "Submission rejected: code mismatch"
            );
            return Err(SessionError::InvalidCode.into());
        }

        let accepted_at = Utc::now();
        session.ledger.upsert(SubmissionEntry {
            participant_id,
            label,
            code: code.clone(),
            accepted_at,
        });

        Ok(SubmissionReceipt {
            session_id: session.id.clone(),
            code,
            accepted_at,
        })
    }

    fn handle_update_code(
        &mut self,
        session_id: Option<&str>,
        code: AttendanceCode,
    ) -> Option<SessionStatus> {
        let SessionState::Active(session) = &mut self.state else {
            debug!(target: "rc.actor.coordinator", "Code update ignored: no active session");
            return None;
        };

        if let Some(expected) = session_id {
            if expected != session.id {
                debug!(
                    target: "rc.actor.coordinator",
                    stale_session_id = %expected,
                    session_id = %session.id,
                    "Code update ignored: stale session"
                );
                return None;
            }
        }

        if code.is_empty() || code == session.code {
            return None;
        }

        session.code = code;
        session.code_issued_at = Utc::now();
        Some(session.status())
    }

    fn handle_end(&mut self) -> Result<EndedSession, RollCallError> {
        let SessionState::Active(mut session) = std::mem::take(&mut self.state) else {
            return Err(SessionError::NoActiveSession.into());
        };

        if let Some(rotation) = &session.rotation {
            rotation.cancel();
        }

        let entries = session.ledger.drain();
        metrics::set_session_active(false);
        metrics::record_session_size(entries.len());

        info!(
            target: "rc.actor.coordinator",
            session_id = %session.id,
            entries = entries.len(),
            "Attendance session ended"
        );

        Ok(EndedSession {
            record: FinalizedRecord {
                session_id: session.id,
                opened_at: session.opened_at,
                closed_at: Utc::now(),
                entries,
            },
            surfaces: session.surfaces,
            rotation: session.rotation,
        })
    }

    fn spawn_rotation(&self, session_id: &str, admin_board: MessageRef) -> RotationHandle {
        let tick = Arc::new(RotationTick {
            session_id: session_id.to_string(),
            mailbox: self.mailbox.clone(),
            generator: self.generator.clone(),
            display: Arc::clone(&self.display),
            admin_board,
        });

        RotationScheduler::spawn(
            self.rotation_interval,
            self.cancel_token.child_token(),
            move || Arc::clone(&tick).run(),
        )
    }
}

/// State shared by every tick of one session's rotation.
struct RotationTick {
    session_id: String,
    mailbox: mpsc::WeakSender<CoordinatorMessage>,
    generator: CodeGenerator,
    display: Arc<dyn DisplaySurface>,
    admin_board: MessageRef,
}

impl RotationTick {
    /// Generate, publish and display one new code.
    async fn run(self: Arc<Self>) -> ControlFlow<()> {
        let Some(mailbox) = self.mailbox.upgrade() else {
            return ControlFlow::Break(());
        };

        let (tx, rx) = oneshot::channel();
        if mailbox
            .send(CoordinatorMessage::Status { respond_to: tx })
            .await
            .is_err()
        {
            return ControlFlow::Break(());
        }
        let Ok(current) = rx.await else {
            return ControlFlow::Break(());
        };
        if current.session_id.as_deref() != Some(self.session_id.as_str()) {
            return ControlFlow::Break(());
        }

        let code = match self.generator.next(current.current_code.as_ref()) {
            Ok(code) => code,
            Err(e) => {
                metrics::record_rotation("generator_error");
                warn!(
                    target: "rc.rotation",
                    session_id = %self.session_id,
                    error = %e,
                    "Failed to generate code, keeping current code"
                );
                return ControlFlow::Continue(());
            }
        };

        let (tx, rx) = oneshot::channel();
        if mailbox
            .send(CoordinatorMessage::UpdateCode {
                session_id: Some(self.session_id.clone()),
                code: code.clone(),
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return ControlFlow::Break(());
        }
        drop(mailbox);

        let Ok(Some(status)) = rx.await else {
            metrics::record_rotation("dropped");
            return ControlFlow::Continue(());
        };
        metrics::record_rotation("published");

        let content = BoardContent::Code {
            code: code.to_string(),
            submissions: status.submission_count,
        };
        match self.display.update(&self.admin_board, content).await {
            Ok(()) => {
                metrics::record_display_update("success");
                ControlFlow::Continue(())
            }
            Err(DisplayError::MessageNotFound) => {
                metrics::record_display_update("not_found");
                warn!(
                    target: "rc.rotation",
                    session_id = %self.session_id,
                    "Code board message is gone, stopping rotation"
                );
                ControlFlow::Break(())
            }
            Err(DisplayError::Unavailable(reason)) => {
                metrics::record_display_update("unavailable");
                warn!(
                    target: "rc.rotation",
                    session_id = %self.session_id,
                    error = %reason,
                    "Failed to refresh code board, will retry next rotation"
                );
                ControlFlow::Continue(())
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::code::DEFAULT_CODE_LENGTH;
    use crate::display::mock::MockDisplay;
    use std::collections::HashSet;

    const INTERVAL: Duration = Duration::from_secs(15);

    fn surfaces() -> SurfaceHandles {
        SurfaceHandles {
            admin: MessageRef {
                channel_id: 100,
                message_id: 1,
            },
            attendance: MessageRef {
                channel_id: 200,
                message_id: 2,
            },
        }
    }

    fn spawn_coordinator(display: Arc<MockDisplay>) -> SessionCoordinatorHandle {
        let (handle, _task) = SessionCoordinator::spawn(
            CodeGenerator::new(DEFAULT_CODE_LENGTH),
            display,
            INTERVAL,
            CancellationToken::new(),
        );
        handle
    }

    async fn start(handle: &SessionCoordinatorHandle, code: &str) -> StartedSession {
        handle
            .start(AttendanceCode::normalize(code), surfaces())
            .await
            .unwrap()
    }

    fn session_err(result: Result<impl std::fmt::Debug, RollCallError>) -> SessionError {
        match result {
            Err(RollCallError::Session(e)) => e,
            other => panic!("expected session error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_starts_inactive() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        assert_eq!(handle.status().await.unwrap(), SessionStatus::inactive());
        handle.cancel();
    }

    #[tokio::test]
    async fn test_submit_is_case_insensitive() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        let started = start(&handle, "WXYZ").await;
        assert_eq!(started.code.as_str(), "WXYZ");

        let receipt = handle
            .submit("1".to_string(), "A".to_string(), " wxyz ")
            .await
            .unwrap();
        assert_eq!(receipt.session_id, started.session_id);

        let status = handle.status().await.unwrap();
        assert!(status.is_active);
        assert_eq!(status.submission_count, 1);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_start_while_active_leaves_state_unchanged() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        let started = start(&handle, "WXYZ").await;
        handle
            .submit("1".to_string(), "A".to_string(), "WXYZ")
            .await
            .unwrap();

        let result = handle
            .start(AttendanceCode::normalize("QQQQ"), surfaces())
            .await;
        assert_eq!(session_err(result), SessionError::SessionAlreadyActive);

        let status = handle.status().await.unwrap();
        assert_eq!(status.session_id, Some(started.session_id));
        assert_eq!(status.current_code, Some(AttendanceCode::normalize("WXYZ")));
        assert_eq!(status.submission_count, 1);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_start_rejects_empty_code() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        let result = handle
            .start(AttendanceCode::normalize("   "), surfaces())
            .await;
        assert!(matches!(result, Err(RollCallError::BadRequest(_))));
        assert!(!handle.status().await.unwrap().is_active);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_end_when_inactive_fails() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        assert_eq!(session_err(handle.end().await), SessionError::NoActiveSession);
        assert_eq!(handle.status().await.unwrap(), SessionStatus::inactive());
        handle.cancel();
    }

    #[tokio::test]
    async fn test_submit_when_inactive_fails() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        let result = handle
            .submit("1".to_string(), "A".to_string(), "WXYZ")
            .await;
        assert_eq!(session_err(result), SessionError::NoActiveSession);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_old_code_rejected_after_update() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        start(&handle, "WXYZ").await;

        let status = handle
            .update_code(AttendanceCode::normalize("NEWT"))
            .await
            .unwrap()
            .expect("update applied");
        assert_eq!(status.current_code, Some(AttendanceCode::normalize("NEWT")));

        let result = handle
            .submit("1".to_string(), "A".to_string(), "WXYZ")
            .await;
        assert_eq!(session_err(result), SessionError::InvalidCode);
        assert_eq!(handle.status().await.unwrap().submission_count, 0);

        handle
            .submit("1".to_string(), "A".to_string(), "newt")
            .await
            .unwrap();
        assert_eq!(handle.status().await.unwrap().submission_count, 1);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_update_code_ignored_when_inactive_or_unchanged() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        assert!(handle
            .update_code(AttendanceCode::normalize("NEWT"))
            .await
            .unwrap()
            .is_none());
        assert!(!handle.status().await.unwrap().is_active);

        start(&handle, "WXYZ").await;
        assert!(handle
            .update_code(AttendanceCode::normalize("wxyz"))
            .await
            .unwrap()
            .is_none());
        assert!(handle
            .update_code(AttendanceCode::normalize(""))
            .await
            .unwrap()
            .is_none());
        handle.cancel();
    }

    #[tokio::test]
    async fn test_stale_session_update_is_fenced() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        let first = start(&handle, "AAAA").await;
        handle.end().await.unwrap();
        let second = start(&handle, "BBBB").await;
        assert_ne!(first.session_id, second.session_id);

        let stale = handle
            .update_code_for(Some(first.session_id), AttendanceCode::normalize("CCCC"))
            .await
            .unwrap();
        assert!(stale.is_none());
        assert_eq!(
            handle.status().await.unwrap().current_code,
            Some(AttendanceCode::normalize("BBBB"))
        );

        let current = handle
            .update_code_for(Some(second.session_id), AttendanceCode::normalize("CCCC"))
            .await
            .unwrap();
        assert!(current.is_some());
        handle.cancel();
    }

    #[tokio::test]
    async fn test_last_submission_wins() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        start(&handle, "AAAA").await;

        handle
            .submit("1".to_string(), "first".to_string(), "AAAA")
            .await
            .unwrap();
        handle
            .update_code(AttendanceCode::normalize("BBBB"))
            .await
            .unwrap();
        // Rejected submissions do not replace the accepted one
        let _ = handle
            .submit("1".to_string(), "stale".to_string(), "AAAA")
            .await;
        handle
            .submit("1".to_string(), "second".to_string(), "BBBB")
            .await
            .unwrap();

        let ended = handle.end().await.unwrap();
        assert_eq!(ended.record.entries.len(), 1);
        assert_eq!(ended.record.entries[0].label, "second");
        assert_eq!(ended.record.entries[0].code.as_str(), "BBBB");
        handle.cancel();
    }

    #[tokio::test]
    async fn test_end_finalizes_distinct_participants() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        let started = start(&handle, "WXYZ").await;
        for id in ["1", "2", "3", "2", "1"] {
            handle
                .submit(id.to_string(), format!("user-{id}"), "WXYZ")
                .await
                .unwrap();
        }

        let ended = handle.end().await.unwrap();
        assert_eq!(ended.record.session_id, started.session_id);
        assert_eq!(ended.record.entries.len(), 3);
        assert_eq!(ended.surfaces, surfaces());
        assert!(ended.record.opened_at <= ended.record.closed_at);

        let rotation = ended.rotation.expect("rotation handle returned");
        assert!(rotation.is_cancelled());
        rotation.shutdown().await;

        assert_eq!(handle.status().await.unwrap(), SessionStatus::inactive());
        let after = handle
            .submit("4".to_string(), "late".to_string(), "WXYZ")
            .await;
        assert_eq!(session_err(after), SessionError::NoActiveSession);
        assert_eq!(session_err(handle.end().await), SessionError::NoActiveSession);
        handle.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distinct_submitters_all_recorded() {
        const N: usize = 200;
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        start(&handle, "WXYZ").await;

        let tasks: Vec<_> = (0..N)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle
                        .submit(format!("p{i}"), format!("participant {i}"), "wxyz")
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(handle.status().await.unwrap().submission_count, N);
        let ended = handle.end().await.unwrap();
        let ids: HashSet<_> = ended
            .record
            .entries
            .iter()
            .map(|e| e.participant_id.clone())
            .collect();
        assert_eq!(ended.record.entries.len(), N);
        assert_eq!(ids.len(), N);
        handle.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_racing_end_are_never_lost() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        start(&handle, "WXYZ").await;

        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle
                        .submit(format!("p{i}"), String::new(), "WXYZ")
                        .await
                        .is_ok()
                })
            })
            .collect();
        let ended = handle.end().await.unwrap();

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap() {
                accepted += 1;
            }
        }
        // Every accepted submission is in the record; the rest saw no session
        assert_eq!(ended.record.entries.len(), accepted);
        handle.cancel();
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let handle = spawn_coordinator(Arc::new(MockDisplay::new()));
        let mut ids = HashSet::new();
        for _ in 0..5 {
            ids.insert(start(&handle, "WXYZ").await.session_id);
            handle.end().await.unwrap();
        }
        assert_eq!(ids.len(), 5);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_publishes_new_codes() {
        let display = Arc::new(MockDisplay::new());
        let handle = spawn_coordinator(Arc::clone(&display));
        start(&handle, "WXYZ").await;

        tokio::time::sleep(INTERVAL * 3 + Duration::from_millis(1)).await;

        let updates = display.updates();
        assert_eq!(updates.len(), 3);
        let mut previous = "WXYZ".to_string();
        for update in &updates {
            let BoardContent::Code { code, .. } = update else {
                panic!("unexpected board content {update:?}");
            };
            assert_ne!(code, &previous);
            previous.clone_from(code);
        }

        let status = handle.status().await.unwrap();
        assert_eq!(status.current_code.unwrap().as_str(), previous);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_reports_submission_count() {
        let display = Arc::new(MockDisplay::new());
        let handle = spawn_coordinator(Arc::clone(&display));
        start(&handle, "WXYZ").await;
        handle
            .submit("1".to_string(), "A".to_string(), "WXYZ")
            .await
            .unwrap();

        tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;

        assert!(matches!(
            display.updates().as_slice(),
            [BoardContent::Code { submissions: 1, .. }]
        ));
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_continues_when_display_unavailable() {
        let display = Arc::new(MockDisplay::new());
        display.set_fail_updates(true);
        let handle = spawn_coordinator(Arc::clone(&display));
        start(&handle, "WXYZ").await;

        tokio::time::sleep(INTERVAL * 3 + Duration::from_millis(1)).await;

        assert_eq!(display.updates().len(), 3);
        let status = handle.status().await.unwrap();
        assert!(status.is_active);
        assert_ne!(status.current_code.unwrap().as_str(), "WXYZ");
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_stops_when_board_deleted() {
        let display = Arc::new(MockDisplay::new());
        display.set_missing_messages(true);
        let handle = spawn_coordinator(Arc::clone(&display));
        start(&handle, "WXYZ").await;

        tokio::time::sleep(INTERVAL * 4 + Duration::from_millis(1)).await;

        assert_eq!(display.updates().len(), 1);
        // Session stays open with the code from the last completed update
        let status = handle.status().await.unwrap();
        assert!(status.is_active);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_rotation_after_end() {
        let display = Arc::new(MockDisplay::new());
        let handle = spawn_coordinator(Arc::clone(&display));
        start(&handle, "WXYZ").await;

        tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;
        assert_eq!(display.updates().len(), 1);

        let ended = handle.end().await.unwrap();
        if let Some(rotation) = ended.rotation {
            rotation.shutdown().await;
        }

        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(display.updates().len(), 1);
        assert_eq!(handle.status().await.unwrap(), SessionStatus::inactive());
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_rotation() {
        let display = Arc::new(MockDisplay::new());
        let (handle, task) = SessionCoordinator::spawn(
            CodeGenerator::new(DEFAULT_CODE_LENGTH),
            Arc::clone(&display) as Arc<dyn DisplaySurface>,
            INTERVAL,
            CancellationToken::new(),
        );
        start(&handle, "WXYZ").await;

        handle.cancel();
        assert!(handle.is_cancelled());
        task.await.unwrap();

        tokio::time::sleep(INTERVAL * 2).await;
        assert!(display.updates().is_empty());
        assert!(handle.status().await.is_err());
    }
}
