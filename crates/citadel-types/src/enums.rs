//! Enumeration types: world actions, permissions, decisions, and outcomes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Actions and permissions
// ---------------------------------------------------------------------------

/// A world action the host asks Citadel to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Break (mine) a block.
    Break,
    /// Place a block.
    Place,
    /// Open a chest, furnace, hopper, or other container.
    OpenContainer,
    /// Open or close a door, trapdoor, or gate.
    UseDoor,
    /// Any other right-click interaction (levers, buttons, beds).
    Interact,
    /// Re-reinforce an existing claim.
    Reinforce,
    /// Change a claim's access records.
    ManageAccess,
    /// Remove a claim entirely.
    RemoveClaim,
}

impl Action {
    /// The permission flag an actor must hold for this action.
    pub const fn required_permission(self) -> Permission {
        match self {
            Self::Break | Self::Place => Permission::Build,
            Self::OpenContainer => Permission::Container,
            Self::UseDoor => Permission::Door,
            Self::Interact => Permission::Interact,
            Self::Reinforce | Self::ManageAccess | Self::RemoveClaim => Permission::Manage,
        }
    }

    /// Stable lowercase name, used for storage and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Break => "break",
            Self::Place => "place",
            Self::OpenContainer => "open_container",
            Self::UseDoor => "use_door",
            Self::Interact => "interact",
            Self::Reinforce => "reinforce",
            Self::ManageAccess => "manage_access",
            Self::RemoveClaim => "remove_claim",
        }
    }

    /// Parse the name produced by [`Action::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "break" => Some(Self::Break),
            "place" => Some(Self::Place),
            "open_container" => Some(Self::OpenContainer),
            "use_door" => Some(Self::UseDoor),
            "interact" => Some(Self::Interact),
            "reinforce" => Some(Self::Reinforce),
            "manage_access" => Some(Self::ManageAccess),
            "remove_claim" => Some(Self::RemoveClaim),
            _ => None,
        }
    }
}

/// A single permission flag on an access record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Break and place blocks.
    Build,
    /// Open containers.
    Container,
    /// Use doors.
    Door,
    /// Other interactions.
    Interact,
    /// Re-reinforce, edit access, and remove the claim.
    Manage,
}

// ---------------------------------------------------------------------------
// Policy and decisions
// ---------------------------------------------------------------------------

/// What to do with actions on unclaimed coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    /// Unclaimed land is free for all.
    #[default]
    Allow,
    /// Unclaimed land is locked down.
    Deny,
}

/// Why an action was denied.
///
/// The [`Display`](core::fmt::Display) text is the message shown to the
/// actor in game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DenyReason {
    /// The actor holds no record granting the required permission.
    NotAuthorized,
    /// Unclaimed land under a deny-by-default policy.
    DefaultPolicy,
    /// The group service could not be reached.
    RegistryUnavailable,
    /// A group referenced by the claim is unknown to the group service.
    GroupNotFound,
    /// No decision could be reached within the latency budget.
    Timeout,
    /// The request itself was malformed.
    Validation(String),
    /// A claim referenced by the request does not exist.
    NotFound,
    /// Internal failure (storage or worker fault).
    SystemFault,
}

impl core::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotAuthorized => write!(f, "not authorized"),
            Self::DefaultPolicy => write!(f, "unclaimed land is protected"),
            Self::RegistryUnavailable => write!(f, "group service unavailable, try again"),
            Self::GroupNotFound => write!(f, "claim references an unknown group"),
            Self::Timeout => write!(f, "protection check timed out"),
            Self::Validation(msg) => write!(f, "invalid request: {msg}"),
            Self::NotFound => write!(f, "claim not found"),
            Self::SystemFault => write!(f, "internal error"),
        }
    }
}

/// The outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    /// The action may proceed.
    Allow,
    /// The action must be cancelled.
    Deny(DenyReason),
}

impl Decision {
    /// Whether this decision allows the action.
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The denial reason, if denied.
    pub const fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit and lifecycle
// ---------------------------------------------------------------------------

/// Recorded outcome of a decision in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The action was allowed.
    Allowed,
    /// The action was denied.
    Denied,
    /// The host cancelled the event before a decision was applied.
    Cancelled,
}

impl AuditOutcome {
    /// Stable lowercase name, used for storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the name produced by [`AuditOutcome::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "allowed" => Some(Self::Allowed),
            "denied" => Some(Self::Denied),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Why a claim left the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionCause {
    /// Removed on request by an authorized actor.
    Removed,
    /// Not refreshed within the decay duration.
    Decayed,
    /// Health reduced to zero.
    Destroyed,
}

impl EvictionCause {
    /// Stable lowercase name, used for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Removed => "removed",
            Self::Decayed => "decayed",
            Self::Destroyed => "destroyed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_map_to_permissions() {
        assert_eq!(Action::Break.required_permission(), Permission::Build);
        assert_eq!(Action::Place.required_permission(), Permission::Build);
        assert_eq!(
            Action::OpenContainer.required_permission(),
            Permission::Container
        );
        assert_eq!(Action::UseDoor.required_permission(), Permission::Door);
        assert_eq!(Action::RemoveClaim.required_permission(), Permission::Manage);
    }

    #[test]
    fn action_names_roundtrip() {
        for action in [
            Action::Break,
            Action::Place,
            Action::OpenContainer,
            Action::UseDoor,
            Action::Interact,
            Action::Reinforce,
            Action::ManageAccess,
            Action::RemoveClaim,
        ] {
            assert_eq!(Action::parse(action.as_str()), Some(action));
        }
        assert_eq!(Action::parse("fly"), None);
    }

    #[test]
    fn not_authorized_message() {
        assert_eq!(DenyReason::NotAuthorized.to_string(), "not authorized");
    }

    #[test]
    fn decision_wire_format() {
        let json = serde_json::to_value(Decision::Deny(DenyReason::Timeout)).ok();
        assert_eq!(
            json,
            Some(serde_json::json!({"decision": "deny", "reason": {"kind": "timeout"}}))
        );
        let allow = serde_json::to_value(Decision::Allow).ok();
        assert_eq!(allow, Some(serde_json::json!({"decision": "allow"})));
    }
}
