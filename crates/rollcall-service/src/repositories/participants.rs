//! Participant registry.
//!
//! Links a participant id from the command surface to an external id and
//! an optional full name.

use crate::errors::RollCallError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::instrument;

/// Participant model (maps to participants table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Participant {
    pub participant_id: String,
    pub external_id: String,
    pub display_name: Option<String>,
    pub username: String,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    /// Best available name for operator-facing messages.
    #[must_use]
    pub fn preferred_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }
}

/// Whether `register` created or replaced a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Created,
    Updated,
}

/// Create or update a participant's registration.
#[instrument(skip_all, fields(participant_id = %participant_id))]
pub async fn register(
    pool: &SqlitePool,
    participant_id: &str,
    username: &str,
    external_id: &str,
    display_name: Option<&str>,
) -> Result<RegistrationOutcome, RollCallError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| RollCallError::Database(format!("Failed to begin transaction: {e}")))?;

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT participant_id FROM participants WHERE participant_id = ?")
            .bind(participant_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RollCallError::Database(format!("Failed to fetch participant: {e}")))?;

    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO participants
            (participant_id, external_id, display_name, username, registered_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (participant_id) DO UPDATE SET
            external_id = excluded.external_id,
            display_name = excluded.display_name,
            username = excluded.username,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(participant_id)
    .bind(external_id)
    .bind(display_name)
    .bind(username)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(|e| RollCallError::Database(format!("Failed to register participant: {e}")))?;

    tx.commit()
        .await
        .map_err(|e| RollCallError::Database(format!("Failed to commit registration: {e}")))?;

    Ok(if existing.is_some() {
        RegistrationOutcome::Updated
    } else {
        RegistrationOutcome::Created
    })
}

/// Look up a participant by external id, participant id or username.
///
/// Matches are tried in that order; usernames compare case-insensitively.
#[instrument(skip_all)]
pub async fn find(pool: &SqlitePool, identifier: &str) -> Result<Option<Participant>, RollCallError> {
    let identifier = identifier.trim().trim_start_matches('@');
    if identifier.is_empty() {
        return Ok(None);
    }

    let participant = sqlx::query_as::<_, Participant>(
        r#"
        SELECT participant_id, external_id, display_name, username, registered_at, updated_at
        FROM participants
        WHERE external_id = ?1
           OR participant_id = ?1
           OR username = ?1 COLLATE NOCASE
        ORDER BY
            CASE
                WHEN external_id = ?1 THEN 0
                WHEN participant_id = ?1 THEN 1
                ELSE 2
            END,
            updated_at DESC
        LIMIT 1
        "#,
    )
    .bind(identifier)
    .fetch_optional(pool)
    .await
    .map_err(|e| RollCallError::Database(format!("Failed to find participant: {e}")))?;

    Ok(participant)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(display_name: Option<&str>) -> Participant {
        Participant {
            participant_id: "42".to_string(),
            external_id: "S-001".to_string(),
            display_name: display_name.map(str::to_string),
            username: "ada".to_string(),
            registered_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_preferred_name() {
        assert_eq!(participant(Some("Ada Lovelace")).preferred_name(), "Ada Lovelace");
        assert_eq!(participant(None).preferred_name(), "ada");
        assert_eq!(participant(Some("")).preferred_name(), "ada");
    }
}
