//! HTTP bridge between the host runtime and the Citadel claim engine.
//!
//! The host plugin talks to the engine over a small JSON API:
//!
//! - **Event decisions** (`POST /api/events`): each world-mutation event is
//!   answered with allow or deny within the gateway's time budget
//! - **Claim management**: create, reinforce, grant and revoke access,
//!   toggle automation access, remove, and inspect the audit trail
//! - **Spatial queries**: point lookup and region queries against the
//!   in-memory index, plus chunk listing and chunk loads from the store
//! - **Group sync**: the host mirrors `NameLayer` group membership into
//!   the engine, which never mutates groups itself
//!
//! Errors are returned as `{ "error": ..., "status": ... }` with a status
//! derived from [`ServiceError::kind`](citadel_core::ServiceError::kind).

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use startup::{StartupError, spawn_server};
pub use state::AppState;
