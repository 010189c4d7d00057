//! Error types for claim lifecycle operations.

use citadel_access::RegistryError;
use citadel_db::StoreError;
use citadel_index::IndexError;
use citadel_types::{ClaimId, DenyReason};

/// Coarse classification of a [`ServiceError`], used by callers to pick a
/// response (status code, denial message, retry) without matching every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is malformed or breaks a claim rule.
    Validation,
    /// The claim, group, or record does not exist.
    NotFound,
    /// A dependency (the group registry) cannot answer right now.
    Unavailable,
    /// The store failed.
    Storage {
        /// Whether the failure might clear on its own.
        transient: bool,
    },
    /// The actor lacks the required permission.
    Unauthorized,
    /// The request conflicts with existing claims.
    Conflict,
}

/// Errors returned by [`ClaimService`](crate::service::ClaimService).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request breaks a claim rule.
    #[error("invalid request: {0}")]
    Validation(String),

    /// No such claim is indexed.
    #[error("claim not found: {0}")]
    ClaimNotFound(ClaimId),

    /// The requested reinforcement type is not configured.
    #[error("unknown reinforcement type {0}")]
    UnknownReinforcement(u16),

    /// The access check refused the actor.
    #[error("denied: {0}")]
    Denied(DenyReason),

    /// The requested region intersects an existing claim.
    #[error("region overlaps claim {0}")]
    Overlap(ClaimId),

    /// Group membership could not be resolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The store failed, after retries where applicable.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The in-memory index rejected a mutation.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl ServiceError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::UnknownReinforcement(_) => ErrorKind::Validation,
            Self::ClaimNotFound(_) => ErrorKind::NotFound,
            Self::Denied(reason) => match reason {
                DenyReason::RegistryUnavailable | DenyReason::Timeout => ErrorKind::Unavailable,
                DenyReason::GroupNotFound | DenyReason::NotFound => ErrorKind::NotFound,
                DenyReason::Validation(_) => ErrorKind::Validation,
                DenyReason::SystemFault => ErrorKind::Storage { transient: false },
                DenyReason::NotAuthorized | DenyReason::DefaultPolicy => ErrorKind::Unauthorized,
            },
            Self::Overlap(_) => ErrorKind::Conflict,
            Self::Registry(RegistryError::Unavailable(_)) => ErrorKind::Unavailable,
            Self::Registry(RegistryError::GroupNotFound(_)) => ErrorKind::NotFound,
            Self::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            Self::Store(StoreError::Duplicate(_)) => ErrorKind::Conflict,
            Self::Store(err) => ErrorKind::Storage {
                transient: err.is_transient(),
            },
            Self::Index(err) => match err {
                IndexError::Overlap { .. } | IndexError::DuplicateClaim(_) => ErrorKind::Conflict,
                IndexError::ClaimNotFound(_) => ErrorKind::NotFound,
                IndexError::InvalidBounds(_) | IndexError::BoundsChanged(_) => {
                    ErrorKind::Validation
                }
            },
        }
    }

    /// The denial an actor sees when this error ends a host event.
    pub fn deny_reason(&self) -> DenyReason {
        match self {
            Self::Denied(reason) => reason.clone(),
            Self::Registry(err) => err.deny_reason(),
            other => match other.kind() {
                ErrorKind::Validation | ErrorKind::Conflict => {
                    DenyReason::Validation(other.to_string())
                }
                ErrorKind::NotFound => DenyReason::NotFound,
                ErrorKind::Unavailable => DenyReason::RegistryUnavailable,
                ErrorKind::Unauthorized => DenyReason::NotAuthorized,
                ErrorKind::Storage { .. } => DenyReason::SystemFault,
            },
        }
    }
}
