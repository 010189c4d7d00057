//! Access control for Citadel claims.
//!
//! - [`AccessController`] answers "may this player do this here?"
//! - [`GroupRegistry`] is the membership capability of the external group
//!   service, with [`InMemoryGroupRegistry`] as the host-synced mirror.
//! - [`AuditSink`] queues one audit entry per decision without blocking.

pub mod audit;
pub mod controller;
pub mod error;
pub mod registry;

pub use audit::{AuditSink, entry_for_cancellation, entry_for_decision};
pub use controller::{AccessController, AccessPolicy, Verdict, evaluate};
pub use error::RegistryError;
pub use registry::{GroupRegistry, InMemoryGroupRegistry};
