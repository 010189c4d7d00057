//! Error types for the `citadel-index` crate.

use citadel_types::ClaimId;

/// Errors that can occur while mutating the claim index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A claim with the same ID is already indexed.
    #[error("duplicate claim id: {0}")]
    DuplicateClaim(ClaimId),

    /// The claim's bounds intersect an already indexed claim.
    #[error("claim {claim} overlaps existing claim {existing}")]
    Overlap {
        /// The rejected claim.
        claim: ClaimId,
        /// The claim already covering part of the region.
        existing: ClaimId,
    },

    /// No claim with this ID is indexed.
    #[error("claim not found: {0}")]
    ClaimNotFound(ClaimId),

    /// The claim's bounds are not normalized.
    #[error("invalid bounds for claim {0}: min corner exceeds max corner")]
    InvalidBounds(ClaimId),

    /// A replacement tried to change the bounds of an indexed claim.
    #[error("claim {0} cannot change bounds in place")]
    BoundsChanged(ClaimId),
}
