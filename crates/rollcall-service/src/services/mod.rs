//! Service layer.

pub mod attendance;
pub mod export;

pub use attendance::AttendanceService;
