//! Actor model for the attendance session.
//!
//! ```text
//! SessionCoordinator (singleton per service instance)
//! ├── owns the session state and the submission ledger
//! └── supervises at most one rotation task per active session
//! ```
//!
//! # Modules
//!
//! - [`coordinator`] - `SessionCoordinator` actor and its handle
//! - [`ledger`] - Latest submission per participant
//! - [`messages`] - Mailbox messages and result types
//! - [`rotation`] - Cancellable periodic code rotation

pub mod coordinator;
pub mod ledger;
pub mod messages;
pub mod rotation;

pub use coordinator::{SessionCoordinator, SessionCoordinatorHandle};
pub use ledger::SubmissionLedger;
pub use messages::*;
pub use rotation::{RotationHandle, RotationScheduler, MIN_ROTATION_INTERVAL};
