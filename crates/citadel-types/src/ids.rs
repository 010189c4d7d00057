//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Claims, groups, players, and audit entries each get a distinct newtype so
//! the compiler rejects a `GroupId` where a `PlayerId` is expected. Claim and
//! audit IDs use UUID v7 (time-ordered) for efficient database indexing.
//! Group and player IDs come from the host and the group service; the
//! `new()` constructors exist for tests and seed data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a claim (a reinforced, protected region).
    ClaimId
}

define_id! {
    /// Identifier of a group owned by the external group service.
    GroupId
}

define_id! {
    /// Identifier of a player (an actor in the host world).
    PlayerId
}

define_id! {
    /// Unique identifier for an audit log entry.
    AuditEntryId
}
