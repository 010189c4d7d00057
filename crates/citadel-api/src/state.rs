//! Shared application state for the HTTP bridge.
//!
//! [`AppState`] holds handles onto the engine's long-lived components.
//! Handlers never own any claim data themselves; every read and write goes
//! through the [`ClaimService`] so the index and the store stay in step.

use std::sync::Arc;

use citadel_access::InMemoryGroupRegistry;
use citadel_core::{ClaimService, EventGateway};

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Claim lifecycle and queries.
    pub service: Arc<ClaimService>,
    /// Host event decisions.
    pub gateway: Arc<EventGateway>,
    /// Group membership mirror fed by the host's `NameLayer` sync.
    pub registry: Arc<InMemoryGroupRegistry>,
}

impl AppState {
    /// Bundle the engine components served over HTTP.
    pub const fn new(
        service: Arc<ClaimService>,
        gateway: Arc<EventGateway>,
        registry: Arc<InMemoryGroupRegistry>,
    ) -> Self {
        Self {
            service,
            gateway,
            registry,
        }
    }
}
