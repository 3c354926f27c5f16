//! Repository integration tests against a migrated SQLite database.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rollcall_service::actors::messages::{FinalizedRecord, SubmissionEntry};
use rollcall_service::code::AttendanceCode;
use rollcall_service::repositories::attendance as attendance_repo;
use rollcall_service::repositories::participants as participants_repo;
use rollcall_service::repositories::{AttendanceStatus, ManualRecord, RecordFilter, RegistrationOutcome};
use sqlx::SqlitePool;

fn entry(participant_id: &str, code: &str, minute: u32) -> SubmissionEntry {
    SubmissionEntry {
        participant_id: participant_id.to_string(),
        label: format!("user-{participant_id}"),
        code: AttendanceCode::normalize(code),
        accepted_at: Utc.with_ymd_and_hms(2025, 3, 4, 9, minute, 0).unwrap(),
    }
}

fn record(session_id: &str, entries: Vec<SubmissionEntry>) -> FinalizedRecord {
    let opened_at = Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap();
    FinalizedRecord {
        session_id: session_id.to_string(),
        opened_at,
        closed_at: opened_at + Duration::minutes(30),
        entries,
    }
}

fn march_4() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_save_records_writes_one_row_per_entry(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let finalized = record(
        "20250304_090000-1",
        vec![entry("1", "ABCD", 1), entry("2", "ABCD", 2), entry("3", "WXYZ", 3)],
    );

    let saved = attendance_repo::save_records(&pool, &finalized).await?;
    assert_eq!(saved, 3);

    let rows = attendance_repo::session_records(&pool, "20250304_090000-1").await?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].participant_id, "1");
    assert_eq!(rows[0].display_label, "user-1");
    assert_eq!(rows[0].code.as_deref(), Some("ABCD"));
    assert_eq!(rows[0].date_id, "2025-03-04");
    assert_eq!(rows[0].status, AttendanceStatus::Present);
    assert_eq!(rows[2].code.as_deref(), Some("WXYZ"));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_save_empty_record_writes_nothing(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let saved = attendance_repo::save_records(&pool, &record("empty-1", vec![])).await?;
    assert_eq!(saved, 0);
    assert!(attendance_repo::list_sessions(&pool).await?.is_empty());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_resaving_session_replaces_rows(pool: SqlitePool) -> Result<(), anyhow::Error> {
    attendance_repo::save_records(&pool, &record("s-1", vec![entry("1", "AAAA", 1)])).await?;
    attendance_repo::save_records(&pool, &record("s-1", vec![entry("1", "BBBB", 5)])).await?;

    let rows = attendance_repo::session_records(&pool, "s-1").await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].code.as_deref(), Some("BBBB"));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_sessions_newest_first(pool: SqlitePool) -> Result<(), anyhow::Error> {
    attendance_repo::save_records(&pool, &record("older", vec![entry("1", "AAAA", 1)])).await?;
    attendance_repo::save_records(&pool, &record("newer", vec![entry("1", "AAAA", 40)])).await?;

    let sessions = attendance_repo::list_sessions(&pool).await?;
    assert_eq!(sessions, vec!["newer".to_string(), "older".to_string()]);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_status_update_by_session_and_date(pool: SqlitePool) -> Result<(), anyhow::Error> {
    attendance_repo::save_records(&pool, &record("s-1", vec![entry("7", "AAAA", 1)])).await?;

    let by_session = RecordFilter::Session("s-1".to_string());
    let updated =
        attendance_repo::update_status(&pool, "7", AttendanceStatus::Excused, &by_session).await?;
    assert_eq!(updated, 1);

    let found = attendance_repo::find_record(&pool, "7", &RecordFilter::Date(march_4()))
        .await?
        .expect("record for the date");
    assert_eq!(found.status, AttendanceStatus::Excused);

    let other_day = RecordFilter::Date(NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
    assert!(attendance_repo::find_record(&pool, "7", &other_day).await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_manual_record_uses_date_session(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let added = attendance_repo::add_manual(
        &pool,
        &ManualRecord {
            participant_id: "9".to_string(),
            display_label: "nine".to_string(),
            date: march_4(),
            session_id: None,
            status: AttendanceStatus::Excused,
        },
    )
    .await?;

    assert_eq!(added.session_id, attendance_repo::manual_session_id(march_4()));
    assert_eq!(added.date_id, "2025-03-04");
    assert_eq!(added.code, None);
    assert_eq!(added.status, AttendanceStatus::Excused);

    // Same participant and session overwrites instead of duplicating
    let again = attendance_repo::add_manual(
        &pool,
        &ManualRecord {
            participant_id: "9".to_string(),
            display_label: "nine".to_string(),
            date: march_4(),
            session_id: None,
            status: AttendanceStatus::Present,
        },
    )
    .await?;
    assert_eq!(again.id, added.id);
    assert_eq!(again.status, AttendanceStatus::Present);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_remove_records_scoped_to_filter(pool: SqlitePool) -> Result<(), anyhow::Error> {
    attendance_repo::save_records(&pool, &record("s-1", vec![entry("1", "AAAA", 1)])).await?;
    attendance_repo::save_records(&pool, &record("s-2", vec![entry("1", "BBBB", 50)])).await?;

    let removed =
        attendance_repo::remove_records(&pool, "1", &RecordFilter::Session("s-1".to_string()))
            .await?;
    assert_eq!(removed, 1);
    assert!(attendance_repo::session_records(&pool, "s-1").await?.is_empty());
    assert_eq!(attendance_repo::session_records(&pool, "s-2").await?.len(), 1);

    let removed = attendance_repo::remove_records(&pool, "1", &RecordFilter::Date(march_4())).await?;
    assert_eq!(removed, 1);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_register_then_update(pool: SqlitePool) -> Result<(), anyhow::Error> {
    let first = participants_repo::register(&pool, "42", "alice", "S-001", None).await?;
    assert_eq!(first, RegistrationOutcome::Created);

    let second =
        participants_repo::register(&pool, "42", "alice", "S-002", Some("Alice A.")).await?;
    assert_eq!(second, RegistrationOutcome::Updated);

    let found = participants_repo::find(&pool, "S-002").await?.expect("registered");
    assert_eq!(found.preferred_name(), "Alice A.");
    assert!(participants_repo::find(&pool, "S-001").await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_participant_by_any_identifier(pool: SqlitePool) -> Result<(), anyhow::Error> {
    participants_repo::register(&pool, "42", "Alice", "S-001", None).await?;

    for identifier in ["S-001", "42", "alice", "@Alice", "  ALICE  "] {
        let found = participants_repo::find(&pool, identifier).await?;
        assert_eq!(
            found.map(|p| p.participant_id),
            Some("42".to_string()),
            "lookup by {identifier:?}"
        );
    }

    assert!(participants_repo::find(&pool, "bob").await?.is_none());
    assert!(participants_repo::find(&pool, "@").await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_external_id_wins_over_username(pool: SqlitePool) -> Result<(), anyhow::Error> {
    // One participant's username equals another's external id
    participants_repo::register(&pool, "1", "S-777", "S-100", None).await?;
    participants_repo::register(&pool, "2", "bob", "S-777", None).await?;

    let found = participants_repo::find(&pool, "S-777").await?.expect("match");
    assert_eq!(found.participant_id, "2");
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_export_rows_join_registration(pool: SqlitePool) -> Result<(), anyhow::Error> {
    participants_repo::register(&pool, "1", "alice", "S-001", Some("Alice")).await?;
    attendance_repo::save_records(
        &pool,
        &record("s-1", vec![entry("1", "AAAA", 1), entry("2", "AAAA", 2)]),
    )
    .await?;

    let rows = attendance_repo::export_rows(&pool, Some("s-1")).await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].external_id.as_deref(), Some("S-001"));
    assert_eq!(rows[0].display_name.as_deref(), Some("Alice"));
    assert_eq!(rows[1].participant_id, "2");
    assert_eq!(rows[1].external_id, None);
    assert_eq!(rows[1].status, "present");

    assert_eq!(attendance_repo::export_rows(&pool, None).await?.len(), 2);
    assert!(attendance_repo::export_rows(&pool, Some("missing")).await?.is_empty());
    Ok(())
}
