//! SQLite connection setup and embedded migrations.

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Schema migrations, applied at startup.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Directory that must exist before SQLite can create the database file.
///
/// Returns `None` for in-memory databases and bare file names.
pub fn database_dir(database_url: &str) -> Option<PathBuf> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return None;
    }

    PathBuf::from(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
}

/// Open the connection pool, creating the database file if needed.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(dir) = database_dir(database_url) {
        debug!(target: "rc.db", dir = %dir.display(), "Ensuring database directory");
        tokio::fs::create_dir_all(&dir).await?;
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_database_dir_relative_file() {
        assert_eq!(
            database_dir("sqlite://data/attendance.db?mode=rwc"),
            Some(PathBuf::from("data"))
        );
    }

    #[test]
    fn test_database_dir_absolute_file() {
        assert_eq!(
            database_dir("sqlite:///var/lib/rollcall/attendance.db"),
            Some(PathBuf::from("/var/lib/rollcall"))
        );
    }

    #[test]
    fn test_database_dir_none() {
        assert_eq!(database_dir("sqlite::memory:"), None);
        assert_eq!(database_dir("sqlite://attendance.db"), None);
        assert_eq!(database_dir("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn test_connect_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("attendance.db");
        let url = format!("sqlite://{}", db_path.display());

        let pool = connect(&url).await.unwrap();
        MIGRATOR.run(&pool).await.unwrap();

        assert!(db_path.exists());
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attendance")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
