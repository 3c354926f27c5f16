//! Attendance repository.
//!
//! Durable attendance records. A closed session is written once by
//! [`save_records`]; the remaining functions support operator corrections
//! (mark present, excuse, remove) and exports.

use crate::actors::messages::FinalizedRecord;
use crate::errors::RollCallError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::instrument;

/// Attendance status stored with each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Excused,
}

impl AttendanceStatus {
    /// Convert to database string representation.
    #[must_use]
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Excused => "excused",
        }
    }

    /// Parse from database string representation.
    #[must_use]
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "excused" => AttendanceStatus::Excused,
            _ => AttendanceStatus::Present,
        }
    }
}

/// Attendance record from database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub participant_id: String,
    pub display_label: String,
    /// Code the participant submitted; `None` for manual records.
    pub code: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub date_id: String,
    pub session_id: String,
    pub status: AttendanceStatus,
}

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    id: i64,
    participant_id: String,
    display_label: String,
    code: Option<String>,
    recorded_at: DateTime<Utc>,
    date_id: String,
    session_id: String,
    status: String,
}

impl From<AttendanceRow> for AttendanceRecord {
    fn from(row: AttendanceRow) -> Self {
        Self {
            id: row.id,
            participant_id: row.participant_id,
            display_label: row.display_label,
            code: row.code,
            recorded_at: row.recorded_at,
            date_id: row.date_id,
            session_id: row.session_id,
            status: AttendanceStatus::from_db_str(&row.status),
        }
    }
}

/// Row shape used by CSV export (attendance joined with the registry).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ExportRow {
    pub participant_id: String,
    pub username: String,
    pub external_id: Option<String>,
    pub display_name: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub date_id: String,
    pub session_id: String,
    pub status: String,
}

/// Which records an operator correction applies to.
///
/// A session id is more specific than a date, so it wins when both are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    Session(String),
    Date(NaiveDate),
}

impl RecordFilter {
    #[must_use]
    pub fn new(session_id: Option<String>, date: NaiveDate) -> Self {
        match session_id {
            Some(id) if !id.trim().is_empty() => RecordFilter::Session(id),
            _ => RecordFilter::Date(date),
        }
    }

    fn column_and_value(&self) -> (&'static str, String) {
        match self {
            RecordFilter::Session(id) => ("session_id", id.clone()),
            RecordFilter::Date(date) => ("date_id", date_id(*date)),
        }
    }
}

/// Manual correction to insert.
#[derive(Debug, Clone)]
pub struct ManualRecord {
    pub participant_id: String,
    pub display_label: String,
    pub date: NaiveDate,
    pub session_id: Option<String>,
    pub status: AttendanceStatus,
}

/// `YYYY-MM-DD` key used for date lookups.
#[must_use]
pub fn date_id(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Session id given to manual records added without one.
#[must_use]
pub fn manual_session_id(date: NaiveDate) -> String {
    format!("manual-{}", date_id(date))
}

const RECORD_COLUMNS: &str =
    "id, participant_id, display_label, code, recorded_at, date_id, session_id, status";

/// Persist a finalized session in a single transaction.
///
/// Re-saving an entry for the same participant and session replaces it.
/// Returns the number of rows written; an empty record writes nothing.
#[instrument(skip_all, fields(session_id = %record.session_id, entries = record.entries.len()))]
pub async fn save_records(pool: &SqlitePool, record: &FinalizedRecord) -> Result<u64, RollCallError> {
    if record.entries.is_empty() {
        return Ok(0);
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| RollCallError::Database(format!("Failed to begin transaction: {e}")))?;

    let mut saved = 0u64;
    for entry in &record.entries {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance
                (participant_id, display_label, code, recorded_at, date_id, session_id, status)
            VALUES (?, ?, ?, ?, ?, ?, 'present')
            ON CONFLICT (participant_id, session_id) DO UPDATE SET
                display_label = excluded.display_label,
                code = excluded.code,
                recorded_at = excluded.recorded_at,
                date_id = excluded.date_id,
                status = excluded.status
            "#,
        )
        .bind(&entry.participant_id)
        .bind(&entry.label)
        .bind(entry.code.as_str())
        .bind(entry.accepted_at)
        .bind(date_id(entry.accepted_at.date_naive()))
        .bind(&record.session_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RollCallError::Database(format!("Failed to save attendance record: {e}")))?;

        saved += result.rows_affected();
    }

    tx.commit()
        .await
        .map_err(|e| RollCallError::Database(format!("Failed to commit attendance records: {e}")))?;

    tracing::debug!(target: "rc.repo", saved, "Attendance records saved");
    Ok(saved)
}

/// All records of one session, oldest first.
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn session_records(
    pool: &SqlitePool,
    session_id: &str,
) -> Result<Vec<AttendanceRecord>, RollCallError> {
    let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance WHERE session_id = ? ORDER BY recorded_at ASC, id ASC"
    ))
    .bind(session_id)
    .fetch_all(pool)
    .await
    .map_err(|e| RollCallError::Database(format!("Failed to fetch session records: {e}")))?;

    Ok(rows.into_iter().map(AttendanceRecord::from).collect())
}

/// Distinct session ids, most recently recorded first.
#[instrument(skip_all)]
pub async fn list_sessions(pool: &SqlitePool) -> Result<Vec<String>, RollCallError> {
    let sessions: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT session_id
        FROM attendance
        GROUP BY session_id
        ORDER BY MAX(recorded_at) DESC, session_id DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| RollCallError::Database(format!("Failed to list sessions: {e}")))?;

    Ok(sessions.into_iter().map(|(id,)| id).collect())
}

/// First record for a participant matching the filter.
#[instrument(skip_all, fields(participant_id = %participant_id))]
pub async fn find_record(
    pool: &SqlitePool,
    participant_id: &str,
    filter: &RecordFilter,
) -> Result<Option<AttendanceRecord>, RollCallError> {
    let (column, value) = filter.column_and_value();
    let row = sqlx::query_as::<_, AttendanceRow>(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance \
         WHERE participant_id = ? AND {column} = ? \
         ORDER BY recorded_at ASC, id ASC LIMIT 1"
    ))
    .bind(participant_id)
    .bind(value)
    .fetch_optional(pool)
    .await
    .map_err(|e| RollCallError::Database(format!("Failed to fetch attendance record: {e}")))?;

    Ok(row.map(AttendanceRecord::from))
}

/// Set the status of a participant's matching records.
///
/// Returns the number of rows updated.
#[instrument(skip_all, fields(participant_id = %participant_id, status = status.as_db_str()))]
pub async fn update_status(
    pool: &SqlitePool,
    participant_id: &str,
    status: AttendanceStatus,
    filter: &RecordFilter,
) -> Result<u64, RollCallError> {
    let (column, value) = filter.column_and_value();
    let result = sqlx::query(&format!(
        "UPDATE attendance SET status = ? WHERE participant_id = ? AND {column} = ?"
    ))
    .bind(status.as_db_str())
    .bind(participant_id)
    .bind(value)
    .execute(pool)
    .await
    .map_err(|e| RollCallError::Database(format!("Failed to update attendance status: {e}")))?;

    Ok(result.rows_affected())
}

/// Insert (or overwrite) a record entered by an operator.
#[instrument(skip_all, fields(participant_id = %record.participant_id))]
pub async fn add_manual(
    pool: &SqlitePool,
    record: &ManualRecord,
) -> Result<AttendanceRecord, RollCallError> {
    let session_id = record
        .session_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| manual_session_id(record.date));

    let row = sqlx::query_as::<_, AttendanceRow>(&format!(
        r#"
        INSERT INTO attendance
            (participant_id, display_label, code, recorded_at, date_id, session_id, status)
        VALUES (?, ?, NULL, ?, ?, ?, ?)
        ON CONFLICT (participant_id, session_id) DO UPDATE SET
            display_label = excluded.display_label,
            date_id = excluded.date_id,
            status = excluded.status
        RETURNING {RECORD_COLUMNS}
        "#
    ))
    .bind(&record.participant_id)
    .bind(&record.display_label)
    .bind(Utc::now())
    .bind(date_id(record.date))
    .bind(&session_id)
    .bind(record.status.as_db_str())
    .fetch_one(pool)
    .await
    .map_err(|e| RollCallError::Database(format!("Failed to add manual attendance: {e}")))?;

    Ok(row.into())
}

/// Delete a participant's matching records. Returns the number removed.
#[instrument(skip_all, fields(participant_id = %participant_id))]
pub async fn remove_records(
    pool: &SqlitePool,
    participant_id: &str,
    filter: &RecordFilter,
) -> Result<u64, RollCallError> {
    let (column, value) = filter.column_and_value();
    let result = sqlx::query(&format!(
        "DELETE FROM attendance WHERE participant_id = ? AND {column} = ?"
    ))
    .bind(participant_id)
    .bind(value)
    .execute(pool)
    .await
    .map_err(|e| RollCallError::Database(format!("Failed to remove attendance: {e}")))?;

    Ok(result.rows_affected())
}

/// Rows for CSV export.
///
/// A single session is ordered oldest first; a full export is ordered by
/// date then time, newest first.
#[instrument(skip_all)]
pub async fn export_rows(
    pool: &SqlitePool,
    session_id: Option<&str>,
) -> Result<Vec<ExportRow>, RollCallError> {
    const SELECT: &str = r#"
        SELECT
            a.participant_id, a.display_label AS username, p.external_id, p.display_name,
            a.recorded_at, a.date_id, a.session_id, a.status
        FROM attendance a
        LEFT JOIN participants p ON p.participant_id = a.participant_id
    "#;

    let rows = match session_id {
        Some(id) => {
            sqlx::query_as::<_, ExportRow>(&format!(
                "{SELECT} WHERE a.session_id = ? ORDER BY a.recorded_at ASC, a.id ASC"
            ))
            .bind(id)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, ExportRow>(&format!(
                "{SELECT} ORDER BY a.date_id DESC, a.recorded_at DESC, a.id DESC"
            ))
            .fetch_all(pool)
            .await
        }
    }
    .map_err(|e| RollCallError::Database(format!("Failed to fetch export rows: {e}")))?;

    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_strings() {
        for status in [AttendanceStatus::Present, AttendanceStatus::Excused] {
            assert_eq!(AttendanceStatus::from_db_str(status.as_db_str()), status);
        }
        assert_eq!(
            serde_json::to_string(&AttendanceStatus::Excused).unwrap(),
            "\"excused\""
        );
    }

    #[test]
    fn test_filter_prefers_session() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(
            RecordFilter::new(Some("20250304_090000-1".to_string()), date),
            RecordFilter::Session("20250304_090000-1".to_string())
        );
        assert_eq!(RecordFilter::new(None, date), RecordFilter::Date(date));
        assert_eq!(
            RecordFilter::new(Some("  ".to_string()), date),
            RecordFilter::Date(date)
        );
    }

    #[test]
    fn test_manual_session_id() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        assert_eq!(date_id(date), "2025-12-01");
        assert_eq!(manual_session_id(date), "manual-2025-12-01");
    }
}
