//! HTTP request handlers for the Roll Call service.

pub mod boards;
pub mod health;
pub mod records;
pub mod session;
pub mod submissions;

pub use boards::get_board;
pub use health::{health_check, metrics_handler, readiness_check};
pub use records::{export_attendance, mark_excused, mark_present, remove_attendance};
pub use session::{close_session, open_session, session_status};
pub use submissions::{register_participant, submit_attendance};
