//! Channel ids and request bodies shared by integration tests.

use serde_json::{json, Value};

/// Admin channel used by [`crate::TestRollCallServer`].
pub const ADMIN_CHANNEL: u64 = 1000;

/// Attendance channel used by [`crate::TestRollCallServer`].
pub const ATTENDANCE_CHANNEL: u64 = 2000;

/// A channel that is neither of the above.
pub const OTHER_CHANNEL: u64 = 3000;

/// Body for endpoints that only need the calling channel.
pub fn channel_body(channel_id: u64) -> Value {
    json!({ "channel_id": channel_id })
}

/// Body for `POST /api/v1/submissions` from the attendance channel.
pub fn submission_body(participant_id: &str, label: &str, code: &str) -> Value {
    json!({
        "channel_id": ATTENDANCE_CHANNEL,
        "participant_id": participant_id,
        "label": label,
        "code": code,
    })
}

/// Body for `POST /api/v1/participants`.
pub fn registration_body(participant_id: &str, username: &str, external_id: &str) -> Value {
    json!({
        "participant_id": participant_id,
        "username": username,
        "external_id": external_id,
    })
}

/// Body for the correction endpoints from the admin channel.
pub fn correction_body(participant: &str, date: Option<&str>, session_id: Option<&str>) -> Value {
    json!({
        "channel_id": ADMIN_CHANNEL,
        "participant": participant,
        "date": date,
        "session_id": session_id,
    })
}
