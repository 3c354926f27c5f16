//! Attendance service flow tests.
//!
//! Drive `AttendanceService` against a migrated database and a
//! `MockDisplay`.

// Test code is allowed to use expect/unwrap for assertions
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

use chrono::{NaiveDate, Utc};
use rollcall_service::actors::SessionCoordinator;
use rollcall_service::code::CodeGenerator;
use rollcall_service::config::Config;
use rollcall_service::display::mock::{DisplayCall, MockDisplay};
use rollcall_service::display::BoardContent;
use rollcall_service::errors::{RollCallError, SessionError};
use rollcall_service::repositories::attendance as attendance_repo;
use rollcall_service::repositories::{AttendanceStatus, RegistrationOutcome};
use rollcall_service::services::AttendanceService;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ADMIN: u64 = 10;
const ATTENDANCE: u64 = 20;

struct Harness {
    service: AttendanceService,
    display: Arc<MockDisplay>,
    pool: SqlitePool,
    export_dir: TempDir,
}

fn harness(pool: SqlitePool) -> Harness {
    let export_dir = tempfile::tempdir().unwrap();
    let vars = HashMap::from([
        ("ROLLCALL_ADMIN_CHANNEL_ID".to_string(), ADMIN.to_string()),
        (
            "ROLLCALL_ATTENDANCE_CHANNEL_ID".to_string(),
            ATTENDANCE.to_string(),
        ),
        (
            "ROLLCALL_EXPORT_DIR".to_string(),
            export_dir.path().display().to_string(),
        ),
    ]);
    let config = Config::from_vars(&vars).unwrap();

    let display = Arc::new(MockDisplay::new());
    let (coordinator, _task) = SessionCoordinator::spawn(
        CodeGenerator::new(config.code_length),
        display.clone(),
        config.rotation_interval,
        CancellationToken::new(),
    );
    let service = AttendanceService::new(pool.clone(), coordinator, display.clone(), &config);

    Harness {
        service,
        display,
        pool,
        export_dir,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_open_posts_both_boards(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);

    let started = h.service.open(ADMIN).await?;
    assert_eq!(started.code.as_str().len(), 4);

    let calls = h.display.calls();
    assert_eq!(
        calls,
        vec![
            DisplayCall::Publish {
                channel_id: ADMIN,
                content: BoardContent::Code {
                    code: started.code.to_string(),
                    submissions: 0,
                },
            },
            DisplayCall::Publish {
                channel_id: ATTENDANCE,
                content: BoardContent::Open,
            },
        ]
    );

    let status = h.service.status(ADMIN).await?;
    assert!(status.is_active);
    assert_eq!(status.session_id.as_deref(), Some(started.session_id.as_str()));
    assert_eq!(status.current_code, Some(started.code));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_commands_enforce_channels(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);

    let err = h.service.open(ATTENDANCE).await.unwrap_err();
    assert!(matches!(err, RollCallError::WrongChannel(_)));
    assert!(h.display.calls().is_empty());

    let started = h.service.open(ADMIN).await?;
    let err = h
        .service
        .submit(ADMIN, "1", "one", started.code.as_str())
        .await
        .unwrap_err();
    assert!(matches!(err, RollCallError::WrongChannel(_)));

    assert!(matches!(
        h.service.status(ATTENDANCE).await.unwrap_err(),
        RollCallError::WrongChannel(_)
    ));
    assert!(matches!(
        h.service.close(ATTENDANCE).await.unwrap_err(),
        RollCallError::WrongChannel(_)
    ));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_second_open_is_rejected_without_posting(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    h.service.open(ADMIN).await?;
    let posted = h.display.calls().len();

    let err = h.service.open(ADMIN).await.unwrap_err();
    assert!(matches!(
        err,
        RollCallError::Session(SessionError::SessionAlreadyActive)
    ));
    assert_eq!(h.display.calls().len(), posted);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_publish_failure_leaves_session_inactive(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    h.display.set_fail_publish(true);

    let err = h.service.open(ADMIN).await.unwrap_err();
    assert!(matches!(err, RollCallError::Display(_)));
    assert!(!h.service.status(ADMIN).await?.is_active);

    h.display.set_fail_publish(false);
    h.service.open(ADMIN).await?;
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_close_persists_each_participant_once(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    let started = h.service.open(ADMIN).await?;
    let code = started.code.to_string();

    h.service.submit(ATTENDANCE, "1", "one", &code).await?;
    h.service.submit(ATTENDANCE, "2", "two", &code.to_lowercase()).await?;
    h.service.submit(ATTENDANCE, "1", "one-again", &code).await?;

    let invalid = h.service.submit(ATTENDANCE, "3", "three", "nope").await.unwrap_err();
    assert!(matches!(
        invalid,
        RollCallError::Session(SessionError::InvalidCode)
    ));

    let closed = h.service.close(ADMIN).await?;
    assert_eq!(closed.session_id, started.session_id);
    assert_eq!(closed.total, 2);
    assert_eq!(closed.saved, 2);

    let rows = attendance_repo::session_records(&h.pool, &started.session_id).await?;
    assert_eq!(rows.len(), 2);
    let one = rows.iter().find(|r| r.participant_id == "1").unwrap();
    assert_eq!(one.display_label, "one-again");
    assert_eq!(one.date_id, Utc::now().date_naive().format("%Y-%m-%d").to_string());

    // Both boards end up closed with the final count
    let updates = h.display.updates();
    assert_eq!(
        updates.iter().filter(|u| **u == BoardContent::Closed { total: 2 }).count(),
        2
    );

    assert!(!h.service.status(ADMIN).await?.is_active);
    let err = h.service.submit(ATTENDANCE, "4", "four", &code).await.unwrap_err();
    assert!(matches!(
        err,
        RollCallError::Session(SessionError::NoActiveSession)
    ));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_dropped_close_still_persists_record(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    let started = h.service.open(ADMIN).await?;
    for participant in ["1", "2", "3"] {
        h.service
            .submit(ATTENDANCE, participant, participant, started.code.as_str())
            .await?;
    }

    // Poll the close once, then drop it before the coordinator replies
    let completed = tokio::select! {
        biased;
        _ = h.service.close(ADMIN) => true,
        () = std::future::ready(()) => false,
    };
    assert!(!completed);

    let mut rows = Vec::new();
    for _ in 0..100 {
        rows = attendance_repo::session_records(&h.pool, &started.session_id).await?;
        if rows.len() == 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(rows.len(), 3);
    assert!(!h.service.status(ADMIN).await?.is_active);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_close_without_session(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    let err = h.service.close(ADMIN).await.unwrap_err();
    assert!(matches!(
        err,
        RollCallError::Session(SessionError::NoActiveSession)
    ));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_empty_session_closes_cleanly(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    h.service.open(ADMIN).await?;

    let closed = h.service.close(ADMIN).await?;
    assert_eq!(closed.total, 0);
    assert_eq!(closed.saved, 0);
    assert!(attendance_repo::list_sessions(&h.pool).await?.is_empty());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_persistence_failure_reports_and_stays_closed(
    pool: SqlitePool,
) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    let started = h.service.open(ADMIN).await?;
    h.service
        .submit(ATTENDANCE, "1", "one", started.code.as_str())
        .await?;

    h.pool.close().await;

    let err = h.service.close(ADMIN).await.unwrap_err();
    match err {
        RollCallError::PersistenceFailed { session_id, lost } => {
            assert_eq!(session_id, started.session_id);
            assert_eq!(lost, 1);
        }
        other => panic!("expected PersistenceFailed, got {other:?}"),
    }

    // The session is not reopened and boards are still retired
    assert!(!h.service.status(ADMIN).await?.is_active);
    assert!(h
        .display
        .updates()
        .contains(&BoardContent::Closed { total: 1 }));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_board_failures_do_not_block_close(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    let started = h.service.open(ADMIN).await?;
    h.service
        .submit(ATTENDANCE, "1", "one", started.code.as_str())
        .await?;

    h.display.set_missing_messages(true);
    let closed = h.service.close(ADMIN).await?;
    assert_eq!(closed.saved, 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_shutdown_closes_open_session(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    let started = h.service.open(ADMIN).await?;
    h.service
        .submit(ATTENDANCE, "1", "one", started.code.as_str())
        .await?;

    h.service.shutdown().await;

    assert!(h.service.coordinator().is_cancelled());
    let rows = attendance_repo::session_records(&h.pool, &started.session_id).await?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_present_updates_existing_record(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    h.service.register("1", "alice", "S-001", Some("Alice")).await?;

    let started = h.service.open(ADMIN).await?;
    h.service
        .submit(ATTENDANCE, "1", "alice", started.code.as_str())
        .await?;
    h.service.close(ADMIN).await?;

    let today = Utc::now().date_naive();
    let excused = h
        .service
        .set_status(ADMIN, "S-001", AttendanceStatus::Excused, today, None)
        .await?;
    assert_eq!(excused.name, "Alice");
    assert_eq!(excused.session_id, started.session_id);
    assert_eq!(excused.previous_status, Some(AttendanceStatus::Present));

    let rows = attendance_repo::session_records(&h.pool, &started.session_id).await?;
    assert_eq!(rows[0].status, AttendanceStatus::Excused);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mark_excused_adds_manual_record(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    h.service.register("2", "bob", "S-002", None).await?;

    let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
    let outcome = h
        .service
        .set_status(ADMIN, "@bob", AttendanceStatus::Excused, date, None)
        .await?;
    assert_eq!(outcome.name, "bob");
    assert_eq!(outcome.previous_status, None);
    assert_eq!(outcome.session_id, attendance_repo::manual_session_id(date));

    let rows = attendance_repo::session_records(&h.pool, &outcome.session_id).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, AttendanceStatus::Excused);
    assert_eq!(rows[0].date_id, "2025-03-04");
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_correction_for_unknown_participant(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    let err = h
        .service
        .set_status(ADMIN, "ghost", AttendanceStatus::Present, Utc::now().date_naive(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RollCallError::NotFound(_)));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_remove_requires_scope(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);
    h.service.register("2", "bob", "S-002", None).await?;

    let err = h.service.remove(ADMIN, "bob", None, None).await.unwrap_err();
    assert!(matches!(err, RollCallError::BadRequest(_)));

    let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
    let err = h.service.remove(ADMIN, "bob", Some(date), None).await.unwrap_err();
    assert!(matches!(err, RollCallError::NotFound(_)));

    h.service
        .set_status(ADMIN, "bob", AttendanceStatus::Present, date, None)
        .await?;
    let removed = h.service.remove(ADMIN, "bob", Some(date), None).await?;
    assert_eq!(removed.removed, 1);
    assert_eq!(removed.participant_id, "2");
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_register_validates_and_reports_outcome(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);

    let err = h.service.register("1", "alice", "   ", None).await.unwrap_err();
    assert!(matches!(err, RollCallError::BadRequest(_)));

    assert_eq!(
        h.service.register("1", "alice", "S-001", None).await?,
        RegistrationOutcome::Created
    );
    assert_eq!(
        h.service.register("1", "alice", "S-001", Some("  ")).await?,
        RegistrationOutcome::Updated
    );
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_export_writes_csv_file(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let h = harness(pool);

    let err = h.service.export(ADMIN, None).await.unwrap_err();
    assert!(matches!(err, RollCallError::NotFound(_)));

    h.service.register("1", "alice", "S-001", Some("Alice")).await?;
    let started = h.service.open(ADMIN).await?;
    h.service
        .submit(ATTENDANCE, "1", "alice", started.code.as_str())
        .await?;
    h.service.close(ADMIN).await?;

    let summary = h.service.export(ADMIN, Some(&started.session_id)).await?;
    assert_eq!(summary.row_count, 1);
    assert!(summary.contents.contains("S-001"));

    let path = summary.path.expect("file written");
    assert!(path.starts_with(h.export_dir.path()));
    let on_disk = tokio::fs::read_to_string(&path).await?;
    assert_eq!(on_disk, summary.contents);

    let err = h.service.export(ATTENDANCE, None).await.unwrap_err();
    assert!(matches!(err, RollCallError::WrongChannel(_)));
    Ok(())
}
