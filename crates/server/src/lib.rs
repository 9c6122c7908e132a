//! HTTP job handlers and SQLite persistence for the compliance autopilot.
//!
//! The engine crate owns the stage logic; this crate owns the store, the
//! action executor, the per-tenant job drivers, and the axum surface that
//! triggers them. Exposed as a library so integration tests can run jobs
//! against an in-memory database.

pub mod api;
pub mod db;
pub mod executor;
pub mod jobs;
pub mod state;

pub use api::build_router;
pub use db::Database;
pub use state::{AppState, SharedState};
