//! Entry point for host world-mutation events.
//!
//! Each event gets a decision within the configured budget; a check that
//! overruns is denied with [`DenyReason::Timeout`]. The host may cancel an
//! event while its check is in flight, in which case no decision is
//! returned and only a cancellation audit entry is written.
//!
//! A denied break on someone else's claim wears the claim down. The
//! damage runs on a background task so the host never waits for the store.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use citadel_access::{AccessController, Verdict, entry_for_cancellation, entry_for_decision};
use citadel_types::{Action, ClaimId, Decision, DenyReason, HostEvent};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use crate::config::GatewayConfig;
use crate::service::ClaimService;

/// The answer to one host event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Echo of [`HostEvent::event_id`].
    pub event_id: u64,
    /// Allow, or deny with a reason.
    pub decision: Decision,
    /// The claim covering the position, if any.
    pub claim_id: Option<ClaimId>,
}

/// Decides host events against the claim index.
pub struct EventGateway {
    access: AccessController,
    service: Arc<ClaimService>,
    config: GatewayConfig,
    runtime: Handle,
    background: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for EventGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EventGateway {
    /// Create a gateway. Background damage tasks are spawned on `runtime`,
    /// which is also the runtime [`handle_blocking`](Self::handle_blocking)
    /// blocks on.
    pub fn new(service: Arc<ClaimService>, config: GatewayConfig, runtime: Handle) -> Self {
        Self {
            access: service.access().clone(),
            service,
            config,
            runtime,
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Decide `event` within the budget.
    pub async fn handle(&self, event: &HostEvent) -> GatewayResponse {
        let check = self
            .access
            .check(event.actor, event.action, event.position);
        let verdict = match tokio::time::timeout(self.config.decision_timeout(), check).await {
            Ok(verdict) => verdict,
            Err(elapsed) => self.timed_out(event, &elapsed),
        };

        self.maybe_damage(event, &verdict);

        GatewayResponse {
            event_id: event.event_id,
            decision: verdict.decision,
            claim_id: verdict.claim_id,
        }
    }

    /// Decide `event` unless `cancelled` resolves first. A cancelled event
    /// yields `None` and leaves only a `Cancelled` audit entry.
    pub async fn handle_cancellable<C>(
        &self,
        event: &HostEvent,
        cancelled: C,
    ) -> Option<GatewayResponse>
    where
        C: Future<Output = ()> + Send,
    {
        tokio::select! {
            biased;
            () = cancelled => {
                let claim_id = self.service.index().lookup(&event.position);
                if let Some(sink) = self.access.audit_sink() {
                    sink.record(entry_for_cancellation(
                        event.actor,
                        event.action,
                        claim_id,
                        event.position,
                    ));
                }
                tracing::debug!(event_id = event.event_id, "Event cancelled before decision");
                None
            }
            response = self.handle(event) => Some(response),
        }
    }

    /// Decide `event` from a host thread that is not part of the runtime,
    /// blocking it for at most the decision budget.
    ///
    /// Any thread that has entered a Tokio runtime is refused with
    /// [`DenyReason::SystemFault`]. That covers async tasks and also
    /// `spawn_blocking` workers, since the two cannot be told apart from
    /// here. Code already on the runtime should await [`Self::handle`], or
    /// from a blocking worker call `Handle::block_on(gateway.handle(..))`
    /// itself.
    pub fn handle_blocking(&self, event: &HostEvent) -> GatewayResponse {
        if Handle::try_current().is_ok() {
            tracing::error!(
                event_id = event.event_id,
                "handle_blocking called from an async context"
            );
            return GatewayResponse {
                event_id: event.event_id,
                decision: Decision::Deny(DenyReason::SystemFault),
                claim_id: self.service.index().lookup(&event.position),
            };
        }
        self.runtime.block_on(self.handle(event))
    }

    /// Wait for every background task spawned so far. Returns how many
    /// finished.
    pub async fn drain_background(&self) -> usize {
        let mut tasks = std::mem::take(
            &mut *self
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut finished: usize = 0;
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                tracing::warn!(error = %err, "Background task failed");
            }
            finished = finished.saturating_add(1);
        }
        finished
    }

    /// Number of background tasks not yet reaped.
    pub fn pending_background(&self) -> usize {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn timed_out(&self, event: &HostEvent, elapsed: &tokio::time::error::Elapsed) -> Verdict {
        let claim_id = self.service.index().lookup(&event.position);
        let decision = Decision::Deny(DenyReason::Timeout);
        tracing::warn!(
            event_id = event.event_id,
            actor = %event.actor,
            position = %event.position,
            error = %elapsed,
            "Access decision timed out, denying"
        );
        if let Some(sink) = self.access.audit_sink() {
            sink.record(entry_for_decision(
                event.actor,
                event.action,
                claim_id,
                event.position,
                &decision,
            ));
        }
        Verdict { decision, claim_id }
    }

    /// Only a genuine refusal damages a claim; outages and timeouts do not.
    fn maybe_damage(&self, event: &HostEvent, verdict: &Verdict) {
        if !self.config.damage_enabled || event.action != Action::Break {
            return;
        }
        let Some(claim_id) = verdict.claim_id else {
            return;
        };
        if verdict.decision != Decision::Deny(DenyReason::NotAuthorized) {
            return;
        }

        let service = Arc::clone(&self.service);
        let amount = self.config.damage_per_break;
        let mut tasks = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while let Some(done) = tasks.try_join_next() {
            if let Err(err) = done {
                tracing::warn!(error = %err, "Background task failed");
            }
        }
        tasks.spawn_on(
            async move {
                match service.damage_claim(claim_id, amount).await {
                    Ok(outcome) => {
                        tracing::debug!(claim = %claim_id, ?outcome, "Break damage applied");
                    }
                    Err(err) => {
                        tracing::warn!(claim = %claim_id, error = %err, "Break damage failed");
                    }
                }
            },
            &self.runtime,
        );
    }
}
