//! Audit entry construction and the non-blocking audit sink.
//!
//! Decisions are made on the host's hot path, so recording them must never
//! block. [`AuditSink`] is the sending half of a bounded channel; a
//! background writer drains the receiving half into the store in batches.
//! When the channel is full the entry is dropped with a warning.

use chrono::Utc;
use citadel_types::{
    Action, AuditEntry, AuditEntryId, AuditOutcome, BlockPos, ClaimId, Decision, PlayerId,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Build an audit entry for a completed decision.
pub fn entry_for_decision(
    actor: PlayerId,
    action: Action,
    claim_id: Option<ClaimId>,
    position: BlockPos,
    decision: &Decision,
) -> AuditEntry {
    let (outcome, reason) = match decision {
        Decision::Allow => (AuditOutcome::Allowed, None),
        Decision::Deny(reason) => (AuditOutcome::Denied, Some(reason.to_string())),
    };
    AuditEntry {
        id: AuditEntryId::new(),
        actor,
        action,
        claim_id,
        position,
        outcome,
        reason,
        created_at: Utc::now(),
    }
}

/// Build an audit entry for an event the host cancelled mid-check.
pub fn entry_for_cancellation(
    actor: PlayerId,
    action: Action,
    claim_id: Option<ClaimId>,
    position: BlockPos,
) -> AuditEntry {
    AuditEntry {
        id: AuditEntryId::new(),
        actor,
        action,
        claim_id,
        position,
        outcome: AuditOutcome::Cancelled,
        reason: None,
        created_at: Utc::now(),
    }
}

/// Cloneable, non-blocking sender of audit entries.
#[derive(Debug, Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditSink {
    /// Create a sink and the receiver its writer should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEntry>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue an entry without waiting. Returns whether it was queued.
    pub fn record(&self, entry: AuditEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    actor = %dropped.actor,
                    action = dropped.action.as_str(),
                    "audit channel full, entry dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("audit writer stopped, entry dropped");
                false
            }
        }
    }
}
