//! # Roll Call Test Utilities
//!
//! Shared test utilities for the Roll Call service.
//!
//! This crate provides:
//! - Server test harness (`TestRollCallServer` for E2E tests)
//! - Channel fixtures and a small JSON API client
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//!
//! #[sqlx::test(migrations = "../../migrations")]
//! async fn test_example(pool: SqlitePool) -> Result<()> {
//!     let server = TestRollCallServer::spawn(pool).await?;
//!     let client = reqwest::Client::new();
//!
//!     let response = client
//!         .get(format!("{}/health", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
