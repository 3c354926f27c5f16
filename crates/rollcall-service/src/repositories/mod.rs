//! Repository layer for database operations.

pub mod attendance;
pub mod participants;

pub use attendance::{AttendanceRecord, AttendanceStatus, ManualRecord, RecordFilter};
pub use participants::{Participant, RegistrationOutcome};
