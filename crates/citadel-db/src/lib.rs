//! Persistence layer for Citadel.
//!
//! Claims, their access records, and the audit trail live in `PostgreSQL`.
//! The claim service only sees the [`ClaimStore`] trait, so tests and
//! database-less runs can swap in [`MemoryClaimStore`].
//!
//! # Modules
//!
//! - [`store`] -- the [`ClaimStore`] capability
//! - [`claim_store`] -- `PostgreSQL` implementation
//! - [`audit_store`] -- batched audit inserts and queries
//! - [`memory`] -- in-memory implementation with failure injection
//! - [`postgres`] -- connection pool and migrations
//! - [`retry`] -- exponential backoff for transient failures
//! - [`error`] -- shared error type

pub mod audit_store;
pub mod claim_store;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod retry;
pub mod store;

pub use audit_store::{AuditRow, AuditStore};
pub use claim_store::{AccessRow, ClaimRow, PgClaimStore};
pub use error::StoreError;
pub use memory::MemoryClaimStore;
pub use postgres::{PostgresConfig, PostgresPool};
pub use retry::{RetryPolicy, with_retry};
pub use store::ClaimStore;
