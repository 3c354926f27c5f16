//! Roll Call Service Library
//!
//! Runs rotating-code attendance sessions:
//!
//! - An operator opens a session from the admin channel; a short code is
//!   shown there and replaced on a fixed interval
//! - Participants submit the code they see from the attendance channel
//! - Closing the session persists one record per participant to SQLite
//! - Operators correct records and export them as CSV
//!
//! # Architecture
//!
//! Handler -> Service -> (Coordinator actor | Repository):
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> actors/coordinator.rs
//!                                                 -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `actors` - Session coordinator, submission ledger and code rotation
//! - `code` - Attendance code type and generator
//! - `config` - Service configuration from environment
//! - `db` - SQLite pool and migrations
//! - `display` - Surfaces that show the code and session boards
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `models` - Request and response bodies
//! - `observability` - Metrics and health state
//! - `repositories` - Attendance and participant tables
//! - `routes` - Axum router setup
//! - `services` - Session orchestration, corrections and export

pub mod actors;
pub mod code;
pub mod config;
pub mod db;
pub mod display;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
