//! Core entity structs: claims, access records, reinforcement, audit, and
//! host events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coords::{BlockPos, Bounds};
use crate::enums::{Action, AuditOutcome, Permission};
use crate::ids::{AuditEntryId, ClaimId, GroupId, PlayerId};

// ---------------------------------------------------------------------------
// Access records
// ---------------------------------------------------------------------------

/// Permission flags carried by one access record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct PermissionSet {
    /// Break and place blocks.
    #[serde(default)]
    pub build: bool,
    /// Open containers.
    #[serde(default)]
    pub container: bool,
    /// Use doors.
    #[serde(default)]
    pub door: bool,
    /// Other interactions.
    #[serde(default)]
    pub interact: bool,
    /// Reinforce, edit access, remove.
    #[serde(default)]
    pub manage: bool,
}

impl PermissionSet {
    /// No permissions at all.
    pub const NONE: Self = Self {
        build: false,
        container: false,
        door: false,
        interact: false,
        manage: false,
    };

    /// Every permission.
    pub const ALL: Self = Self {
        build: true,
        container: true,
        door: true,
        interact: true,
        manage: true,
    };

    /// Whether the set includes `permission`.
    pub const fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::Build => self.build,
            Permission::Container => self.container,
            Permission::Door => self.door,
            Permission::Interact => self.interact,
            Permission::Manage => self.manage,
        }
    }

    /// Return a copy with `permission` set to `granted`.
    #[must_use]
    pub const fn with(mut self, permission: Permission, granted: bool) -> Self {
        match permission {
            Permission::Build => self.build = granted,
            Permission::Container => self.container = granted,
            Permission::Door => self.door = granted,
            Permission::Interact => self.interact = granted,
            Permission::Manage => self.manage = granted,
        }
        self
    }
}

/// Who an access record applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AccessSubject {
    /// Every member of a group.
    Group(GroupId),
    /// One player, overriding any group records.
    Player(PlayerId),
}

impl AccessSubject {
    /// Stable lowercase kind name, used for storage.
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::Group(_) => "group",
            Self::Player(_) => "player",
        }
    }

    /// The raw UUID of the subject.
    pub const fn uuid(&self) -> uuid::Uuid {
        match self {
            Self::Group(id) => id.into_inner(),
            Self::Player(id) => id.into_inner(),
        }
    }
}

/// Per-subject permission flags on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessRecord {
    /// The group or player this record applies to.
    pub subject: AccessSubject,
    /// Granted permissions.
    pub permissions: PermissionSet,
}

// ---------------------------------------------------------------------------
// Reinforcement
// ---------------------------------------------------------------------------

/// Configured kind of reinforcement material (stone, iron, diamond, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinforcementType {
    /// Stable numeric identifier, persisted with each claim.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Health of a freshly reinforced claim.
    pub health: u32,
    /// Seconds after reinforcement before the claim is mature.
    #[serde(default)]
    pub maturation_secs: u64,
}

/// Reinforcement state of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reinforcement {
    /// Which [`ReinforcementType`] was used.
    pub type_id: u16,
    /// Remaining health; the claim is destroyed at zero.
    pub health: u32,
    /// Whether host automation (hoppers and the like) may move items in
    /// and out of the claim's containers.
    #[serde(default)]
    pub insecure: bool,
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// An owned, protected region of the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Unique identifier.
    pub id: ClaimId,
    /// Group that owns the claim.
    pub group_id: GroupId,
    /// The protected box.
    pub bounds: Bounds,
    /// When the claim was first reinforced.
    pub created_at: DateTime<Utc>,
    /// When the claim was last reinforced; decay counts from here.
    pub refreshed_at: DateTime<Utc>,
    /// Reinforcement material and health.
    pub reinforcement: Reinforcement,
    /// Access records, at most one per subject. The owning group always has
    /// a full record.
    pub access: Vec<AccessRecord>,
}

impl Claim {
    /// The record for `subject`, if present.
    pub fn record_for(&self, subject: &AccessSubject) -> Option<&AccessRecord> {
        self.access.iter().find(|r| &r.subject == subject)
    }

    /// Insert or replace the record for `record.subject`.
    pub fn upsert_record(&mut self, record: AccessRecord) {
        if let Some(existing) = self.access.iter_mut().find(|r| r.subject == record.subject) {
            existing.permissions = record.permissions;
        } else {
            self.access.push(record);
        }
    }

    /// Remove the record for `subject`. Returns whether one was present.
    pub fn remove_record(&mut self, subject: &AccessSubject) -> bool {
        let before = self.access.len();
        self.access.retain(|r| &r.subject != subject);
        self.access.len() != before
    }

    /// Groups referenced by this claim's access records, owner first.
    pub fn referenced_groups(&self) -> Vec<GroupId> {
        let mut groups = vec![self.group_id];
        for record in &self.access {
            if let AccessSubject::Group(g) = record.subject {
                if !groups.contains(&g) {
                    groups.push(g);
                }
            }
        }
        groups
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Immutable record of one access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier.
    pub id: AuditEntryId,
    /// Who attempted the action.
    pub actor: PlayerId,
    /// What was attempted.
    pub action: Action,
    /// The claim covering the position, if any.
    pub claim_id: Option<ClaimId>,
    /// Where it was attempted.
    pub position: BlockPos,
    /// What happened.
    pub outcome: AuditOutcome,
    /// Denial reason text, for denied outcomes.
    pub reason: Option<String>,
    /// When the decision was made.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Host events
// ---------------------------------------------------------------------------

/// A world-mutation event delivered by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEvent {
    /// Host-assigned event sequence number, echoed in the response.
    pub event_id: u64,
    /// The acting player.
    pub actor: PlayerId,
    /// What the player is trying to do.
    pub action: Action,
    /// The targeted block.
    pub position: BlockPos,
}
