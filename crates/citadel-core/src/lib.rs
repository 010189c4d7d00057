//! Claim lifecycle and host event handling for Citadel.
//!
//! This crate ties the index, access controller, and store together:
//!
//! - [`ClaimService`] creates, reinforces, edits, damages, decays, and
//!   removes claims, writing through to the store before the index.
//! - [`EventGateway`] decides host events within a time budget and
//!   schedules break damage.
//! - [`workers`] runs the audit writer and the decay sweeper.
//! - [`config`] loads `citadel-config.yaml`.

pub mod config;
pub mod decay;
pub mod error;
pub mod gateway;
pub mod service;
pub mod workers;

pub use config::{CitadelConfig, ConfigError};
pub use error::{ErrorKind, ServiceError};
pub use gateway::{EventGateway, GatewayResponse};
pub use service::{ClaimService, DamageOutcome, NewClaim};
pub use workers::{AuditWriterConfig, spawn_audit_writer, spawn_decay_sweeper};
