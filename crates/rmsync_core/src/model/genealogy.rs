//! Genealogy records loaded from the source database.
//!
//! # Invariants
//! - `OwnerId` is the only join key between source and tag store.
//! - Records are rebuilt on every run and never mutated after load.
//! - `0` in any id or year field means "absent/unknown".

use crate::model::label::{format_family, format_person};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stable, source-assigned person identity (RootsMagic `OwnerID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl OwnerId {
    /// `0` marks an absent parent in family rows.
    pub fn is_absent(self) -> bool {
        self.0 == 0
    }

    /// Parses the value stored in the identity tag property.
    pub fn parse_property(value: &str) -> Option<Self> {
        value.trim().parse::<i64>().ok().map(Self)
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source-assigned family identity (RootsMagic `FamilyID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FamilyId(pub i64);

impl FamilyId {
    pub fn is_absent(self) -> bool {
        self.0 == 0
    }
}

impl Display for FamilyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw person row as read from the genealogy store, before trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRow {
    pub owner_id: i64,
    pub given_name: String,
    pub surname: String,
    pub birth_year: i64,
    pub death_year: i64,
    /// Minimum family id among families listing this person as a child.
    pub family_id: i64,
}

/// Raw family row with parent primary names already joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyRow {
    pub family_id: i64,
    pub father_owner_id: i64,
    pub mother_owner_id: i64,
    pub father_given: String,
    pub father_surname: String,
    pub mother_given: String,
    pub mother_surname: String,
}

/// One person to mirror as a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub owner_id: OwnerId,
    pub given_name: String,
    pub surname: String,
    pub birth_year: i64,
    pub death_year: i64,
    pub family_id: FamilyId,
    /// Canonical tag label, computed once at load.
    pub display_label: String,
}

impl PersonRecord {
    pub fn new(
        owner_id: OwnerId,
        given_name: impl Into<String>,
        surname: impl Into<String>,
        birth_year: i64,
        death_year: i64,
        family_id: FamilyId,
    ) -> Self {
        let mut record = Self {
            owner_id,
            given_name: trim_trailing(&given_name.into()),
            surname: trim_trailing(&surname.into()),
            birth_year,
            death_year,
            family_id,
            display_label: String::new(),
        };
        record.display_label = format_person(&record);
        record
    }
}

impl From<PersonRow> for PersonRecord {
    fn from(row: PersonRow) -> Self {
        Self::new(
            OwnerId(row.owner_id),
            row.given_name,
            row.surname,
            row.birth_year,
            row.death_year,
            FamilyId(row.family_id),
        )
    }
}

/// One family group to mirror as an intermediate tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRecord {
    pub family_id: FamilyId,
    pub father_owner_id: OwnerId,
    pub mother_owner_id: OwnerId,
    pub father_given: String,
    pub father_surname: String,
    pub mother_given: String,
    pub mother_surname: String,
    pub group_label: String,
}

impl From<FamilyRow> for FamilyRecord {
    fn from(row: FamilyRow) -> Self {
        let mut record = Self {
            family_id: FamilyId(row.family_id),
            father_owner_id: OwnerId(row.father_owner_id),
            mother_owner_id: OwnerId(row.mother_owner_id),
            father_given: trim_trailing(&row.father_given),
            father_surname: trim_trailing(&row.father_surname),
            mother_given: trim_trailing(&row.mother_given),
            mother_surname: trim_trailing(&row.mother_surname),
            group_label: String::new(),
        };
        record.group_label = format_family(&record);
        record
    }
}

fn trim_trailing(value: &str) -> String {
    value.trim_end_matches([' ', '\t']).to_string()
}
