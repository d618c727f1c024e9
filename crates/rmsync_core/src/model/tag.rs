//! Destination tag tree model.
//!
//! # Invariants
//! - `TagId` is assigned by the store and never reused as a join key.
//! - Root-level containers have `parent_id == TagId::ROOT`.
//! - Person nodes are bound to people through `IDENTITY_PROPERTY`, not
//!   through their name or id.

use crate::model::genealogy::OwnerId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Property binding a tag to a genealogy `OwnerId`.
pub const IDENTITY_PROPERTY: &str = "rootsmagic_owner_id";
/// Property mirroring a person tag's display name for digiKam face tagging.
pub const DISPLAY_PROPERTY: &str = "person";
/// Property marking a family group tag.
pub const FAMILY_PROPERTY: &str = "family_id";

/// digiKam KDE icon name for person tags.
pub const PERSON_ICON: &str = "user";
/// digiKam KDE icon name for family group tags.
pub const FAMILY_ICON: &str = "system-users";

/// Store-assigned tag row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub i64);

impl TagId {
    /// Parent id of root-level tags.
    pub const ROOT: TagId = TagId(0);
}

impl Display for TagId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag row as seen by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagNode {
    pub tag_id: TagId,
    pub display_name: String,
    pub parent_id: TagId,
    /// Value of `IDENTITY_PROPERTY`; `None` marks a legacy node.
    pub owner_id: Option<OwnerId>,
}

impl TagNode {
    pub fn is_legacy(&self) -> bool {
        self.owner_id.is_none()
    }
}

/// Kind of node a create call produces; adapters map it to an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Branch root (`RootsMagic`, `Lost & Found`).
    Container,
    FamilyGroup,
    Person,
}

impl TagKind {
    pub fn icon_name(self) -> Option<&'static str> {
        match self {
            Self::Container => None,
            Self::FamilyGroup => Some(FAMILY_ICON),
            Self::Person => Some(PERSON_ICON),
        }
    }
}
