//! Change-action encoding.
//!
//! A mutation on one server is broadcast to the cluster as a batch of
//! [`ActionSet`] records: an entity id plus a bitmask of orthogonal
//! invalidation instructions. The bit values are a versioned wire contract
//! and must match on every server.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::entities::EntityId;

bitflags! {
    /// Invalidation instructions attached to a content notification.
    ///
    /// Each content entity has a NEWEST revision and may have a PUBLISHED
    /// revision; they may be the same data. The bits are instructions, not
    /// states, and combine freely. The `*_ALL_*` variants are bulk signals
    /// that apply to every entity of the kind; the reindex path recognizes
    /// them but emits no operations for them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeActions: u32 {
        /// Re-derive the published representation for this id.
        const REFRESH_PUBLISHED = 1;
        /// Bulk: re-derive the published representation for every entity.
        const REFRESH_ALL_PUBLISHED = 2;
        /// The published revision is gone (unpublish); purge it.
        const REMOVE_PUBLISHED = 4;
        /// Re-derive the newest representation for this id.
        const REFRESH_NEWEST = 8;
        /// Bulk: re-derive the newest representation for every entity.
        const REFRESH_ALL_NEWEST = 16;
        /// The entity is permanently gone; purge the newest representation.
        const REMOVE_NEWEST = 32;
    }
}

impl ChangeActions {
    /// Bits that affect a published representation.
    pub fn affects_published(self) -> bool {
        self.intersects(
            Self::REFRESH_PUBLISHED | Self::REMOVE_PUBLISHED | Self::REFRESH_ALL_PUBLISHED,
        )
    }

    /// Bits that affect the newest representation.
    pub fn affects_newest(self) -> bool {
        self.intersects(Self::REFRESH_NEWEST | Self::REMOVE_NEWEST | Self::REFRESH_ALL_NEWEST)
    }
}

/// One notification item: a target entity id plus its action bits.
///
/// Ephemeral: built by the adapter layer per mutation, consumed and
/// discarded within one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    #[serde(rename = "Id")]
    pub id: EntityId,
    #[serde(rename = "Action", with = "action_bits")]
    pub actions: ChangeActions,
}

impl ActionSet {
    pub fn new(id: EntityId, actions: ChangeActions) -> Self {
        Self { id, actions }
    }

    /// Build the action set for a domain event, applying the fixed
    /// event-to-bits mapping shared with the adapter layer.
    pub fn for_event(id: EntityId, event: ChangeEvent) -> Self {
        Self::new(id, event.actions())
    }
}

/// Raw-integer round-trip for the action bitmask.
///
/// The wire carries the bits as a plain integer. Unknown bits are retained
/// at decode time; rejecting invalid combinations happens downstream.
mod action_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ChangeActions;

    pub fn serialize<S: Serializer>(actions: &ChangeActions, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u32(actions.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ChangeActions, D::Error> {
        Ok(ChangeActions::from_bits_retain(u32::deserialize(d)?))
    }
}

/// Domain events that produce content notifications.
///
/// The mapping to action bits is a fixed table, part of the contract with
/// the adapter layer that observes domain mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    Save,
    Rollback,
    Publish,
    SaveAndPublish,
    Unpublish,
    /// Published again because an ancestor was re-published.
    Republish,
    /// Permanent delete.
    Delete,
    Sort {
        has_published: bool,
    },
    Move {
        has_published: bool,
    },
    CancelEdits,
}

impl ChangeEvent {
    pub fn actions(self) -> ChangeActions {
        match self {
            Self::Save | Self::Rollback | Self::CancelEdits => ChangeActions::REFRESH_NEWEST,
            Self::Publish | Self::SaveAndPublish => {
                ChangeActions::REFRESH_NEWEST | ChangeActions::REFRESH_PUBLISHED
            }
            Self::Unpublish => ChangeActions::REFRESH_NEWEST | ChangeActions::REMOVE_PUBLISHED,
            Self::Republish => ChangeActions::REFRESH_PUBLISHED,
            Self::Delete => ChangeActions::REMOVE_NEWEST | ChangeActions::REMOVE_PUBLISHED,
            Self::Sort { has_published } | Self::Move { has_published } => {
                if has_published {
                    ChangeActions::REFRESH_NEWEST | ChangeActions::REFRESH_PUBLISHED
                } else {
                    ChangeActions::REFRESH_NEWEST
                }
            }
        }
    }
}

/// Single-state change operation for a media entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOperation {
    Saved,
    Trashed,
    Deleted,
}

impl MediaOperation {
    fn code(self) -> u8 {
        match self {
            Self::Saved => 0,
            Self::Trashed => 1,
            Self::Deleted => 2,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Saved),
            1 => Some(Self::Trashed),
            2 => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl Serialize for MediaOperation {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for MediaOperation {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(d)?;
        Self::from_code(code).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown media operation code {code}"))
        })
    }
}

/// One media notification item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaChange {
    #[serde(rename = "Id")]
    pub id: EntityId,
    #[serde(rename = "Operation")]
    pub operation: MediaOperation,
}

impl MediaChange {
    pub fn new(id: EntityId, operation: MediaOperation) -> Self {
        Self { id, operation }
    }
}
