//! Roll Call request and response models.
//!
//! Every command carries the channel it was issued from; the service
//! applies the channel policy.

use crate::display::BoardMessage;
use crate::repositories::RegistrationOutcome;
use serde::{Deserialize, Serialize};

/// Body of operator commands that only need a channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelRequest {
    pub channel_id: u64,
}

/// Query string of operator reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelQuery {
    pub channel_id: u64,
}

/// `POST /api/v1/submissions`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub channel_id: u64,
    pub participant_id: String,
    /// Display label; defaults to the participant id.
    #[serde(default)]
    pub label: Option<String>,
    pub code: String,
}

/// `POST /api/v1/participants`
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub participant_id: String,
    pub username: String,
    pub external_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterResponse {
    pub participant_id: String,
    pub outcome: RegistrationOutcome,
}

/// `GET /api/v1/exports`
#[derive(Debug, Clone, Deserialize)]
pub struct ExportQuery {
    pub channel_id: u64,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /api/v1/attendance/{present,excused,remove}`
#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionRequest {
    pub channel_id: u64,
    /// External id, username or participant id.
    pub participant: String,
    /// `YYYY-MM-DD`; defaults to today except for removals.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `GET /api/v1/boards/{channel_id}`
#[derive(Debug, Clone, Serialize)]
pub struct BoardResponse {
    pub channel_id: u64,
    pub messages: Vec<BoardMessage>,
}

/// Readiness check response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
