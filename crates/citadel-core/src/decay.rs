//! Reinforcement wear: maturation, break damage, and decay expiry.
//!
//! A freshly reinforced claim is immature for its type's
//! `maturation_secs` and takes multiplied damage until then. Decay is
//! measured from `refreshed_at`; re-reinforcing restarts both clocks.

use chrono::{DateTime, Utc};
use citadel_types::{Claim, ReinforcementType};

/// Whether `claim` has matured under `kind` at `now`.
pub fn is_mature(claim: &Claim, kind: &ReinforcementType, now: DateTime<Utc>) -> bool {
    let Ok(secs) = i64::try_from(kind.maturation_secs) else {
        return false;
    };
    chrono::Duration::try_seconds(secs)
        .and_then(|d| claim.refreshed_at.checked_add_signed(d))
        .is_some_and(|matures_at| now >= matures_at)
}

/// Damage dealt by one hit of `base`, after the immaturity multiplier.
pub const fn effective_damage(base: u32, mature: bool, immature_multiplier: u32) -> u32 {
    if mature {
        base
    } else {
        base.saturating_mul(immature_multiplier)
    }
}

/// Whether a claim last refreshed at `refreshed_at` has decayed by `now`.
pub fn has_decayed(
    refreshed_at: DateTime<Utc>,
    ttl: chrono::Duration,
    now: DateTime<Utc>,
) -> bool {
    refreshed_at
        .checked_add_signed(ttl)
        .is_some_and(|deadline| deadline < now)
}
