//! Spatial claim index for the Citadel protection engine.
//!
//! This crate answers "who owns this block?" It holds every active claim in
//! memory, keyed by 16x16 chunk column, and keeps the no-overlap invariant:
//! no block is ever contained by two claims.
//!
//! # Modules
//!
//! - [`index`] -- [`ClaimIndex`], the arena-backed chunk grid with point and
//!   region queries.
//! - [`shared`] -- [`SharedClaimIndex`], a cloneable `RwLock` handle for
//!   concurrent readers and short exclusive writes.
//! - [`locks`] -- [`RegionLocks`], striped async mutexes that serialize
//!   writers over overlapping regions.
//! - [`error`] -- Error types for index mutation.

pub mod error;
pub mod index;
pub mod locks;
pub mod shared;

// Re-export primary types at crate root.
pub use error::IndexError;
pub use index::ClaimIndex;
pub use locks::{RegionGuard, RegionLocks};
pub use shared::SharedClaimIndex;
