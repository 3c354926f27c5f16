//! Observability for the Roll Call service.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `rc_sessions_active` | Gauge | none | 1 while a session is open |
//! | `rc_submissions_total` | Counter | `outcome` | Participant submissions |
//! | `rc_code_rotations_total` | Counter | `outcome` | Rotation ticks |
//! | `rc_display_updates_total` | Counter | `outcome` | Display surface calls |
//! | `rc_persistence_total` | Counter | `outcome` | Close-time saves |
//! | `rc_persistence_duration_seconds` | Histogram | none | Save latency |
//! | `rc_records_saved_total` | Counter | none | Rows written |
//! | `rc_session_size` | Histogram | none | Entries per finalized session |

pub mod health;
pub mod metrics;

pub use health::HealthState;
pub use metrics::init_metrics_recorder;
