//! Error types for the `citadel-access` crate.

use citadel_types::{DenyReason, GroupId};

/// Errors returned by a [`GroupRegistry`](crate::registry::GroupRegistry).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The group service could not be reached or answered with a fault.
    #[error("group registry unavailable: {0}")]
    Unavailable(String),

    /// The group service does not know this group.
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),
}

impl RegistryError {
    /// The denial reason this failure maps to. Never an allow.
    pub const fn deny_reason(&self) -> DenyReason {
        match self {
            Self::Unavailable(_) => DenyReason::RegistryUnavailable,
            Self::GroupNotFound(_) => DenyReason::GroupNotFound,
        }
    }
}
