//! CSV export of attendance records.
//!
//! Files are written as RFC 4180 CSV with a fixed header, one row per
//! attendance record, enriched with registry data where the participant has
//! registered.

use crate::errors::RollCallError;
use crate::repositories::attendance::{self, ExportRow};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Column order of every export.
pub const CSV_HEADER: [&str; 8] = [
    "participant_id",
    "username",
    "external_id",
    "display_name",
    "recorded_at",
    "date_id",
    "session_id",
    "status",
];

/// Result of an export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub file_name: String,
    /// Where the file was written; `None` when there was nothing to export.
    pub path: Option<PathBuf>,
    pub row_count: usize,
    pub contents: String,
}

/// File name for an export: one session, or everything stamped with `now`.
#[must_use]
pub fn export_file_name(session_id: Option<&str>, now: DateTime<Utc>) -> String {
    match session_id {
        Some(id) => {
            let safe: String = id
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect();
            format!("attendance_{safe}.csv")
        }
        None => format!("attendance_all_{}.csv", now.format("%Y%m%d_%H%M%S")),
    }
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_field(field));
    }
    out.push_str("\r\n");
}

/// Render rows as CSV, header included.
#[must_use]
pub fn render_csv(rows: &[ExportRow]) -> String {
    let mut out = String::new();
    push_record(&mut out, CSV_HEADER);

    for row in rows {
        let recorded_at = row.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string();
        push_record(
            &mut out,
            [
                row.participant_id.as_str(),
                row.username.as_str(),
                row.external_id.as_deref().unwrap_or(""),
                row.display_name.as_deref().unwrap_or(""),
                recorded_at.as_str(),
                row.date_id.as_str(),
                row.session_id.as_str(),
                row.status.as_str(),
            ],
        );
    }
    out
}

/// Export one session (or all records) to a CSV file under `dir`.
///
/// Nothing is written when there are no matching rows.
#[instrument(skip_all, fields(session_id = ?session_id))]
pub async fn export_csv(
    pool: &SqlitePool,
    dir: &Path,
    session_id: Option<&str>,
) -> Result<ExportSummary, RollCallError> {
    let rows = attendance::export_rows(pool, session_id).await?;
    let file_name = export_file_name(session_id, Utc::now());
    let contents = render_csv(&rows);

    if rows.is_empty() {
        return Ok(ExportSummary {
            file_name,
            path: None,
            row_count: 0,
            contents,
        });
    }

    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        RollCallError::Internal(format!("Failed to create export directory: {e}"))
    })?;
    let path = dir.join(&file_name);
    tokio::fs::write(&path, contents.as_bytes())
        .await
        .map_err(|e| RollCallError::Internal(format!("Failed to write export file: {e}")))?;

    tracing::info!(
        target: "rc.export",
        file = %path.display(),
        rows = rows.len(),
        "Attendance exported"
    );

    Ok(ExportSummary {
        file_name,
        path: Some(path),
        row_count: rows.len(),
        contents,
    })
}
