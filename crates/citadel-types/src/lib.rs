//! Shared type definitions for the Citadel protection engine.
//!
//! This crate is the single source of truth for the types that cross crate
//! boundaries: the index, the access controller, the store, the gateway,
//! and the HTTP bridge all speak in these terms.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for claims, groups, players, audit
//! - [`coords`] -- Block positions, chunk columns, and claim bounds
//! - [`enums`] -- Actions, permissions, decisions, and audit outcomes
//! - [`structs`] -- Claims, access records, reinforcement, audit, host events

pub mod coords;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use coords::{BlockPos, Bounds, CHUNK_SHIFT, ChunkPos, WorldId, chunk_offset, to_chunk_coord};
pub use enums::{
    Action, AuditOutcome, Decision, DefaultPolicy, DenyReason, EvictionCause, Permission,
};
pub use ids::{AuditEntryId, ClaimId, GroupId, PlayerId};
pub use structs::{
    AccessRecord, AccessSubject, AuditEntry, Claim, HostEvent, PermissionSet, Reinforcement,
    ReinforcementType,
};
