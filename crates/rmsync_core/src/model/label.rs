//! Canonical tag labels for people and family groups.
//!
//! # Responsibility
//! - Compute the display label every component compares against.
//!
//! # Invariants
//! - Pure functions; identical input always yields identical output.
//! - Any change to the produced format must bump `LABEL_FORMAT_VERSION`
//!   and keep `is_current_person_label` in sync, because stored names are
//!   compared against freshly computed labels.

use crate::model::genealogy::{FamilyRecord, OwnerId, PersonRecord};
use once_cell::sync::Lazy;
use regex::Regex;

/// Version of the person/family label format produced by this module.
///
/// v1 labels had no `(OwnerID: N)` suffix; v2 is the current format.
pub const LABEL_FORMAT_VERSION: u32 = 2;

const UNKNOWN: &str = "unknown";

static PERSON_LABEL_V2: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.* (?:unknown|-?\d+)-(?:unknown|-?\d+) \(OwnerID: -?\d+\)$")
        .expect("valid person label regex")
});

/// `"{given} {surname} {birth}-{death} (OwnerID: {id})"`, years `0` → `unknown`.
pub fn format_person(person: &PersonRecord) -> String {
    format!(
        "{} {} {}-{} (OwnerID: {})",
        person.given_name,
        person.surname,
        year_or_unknown(person.birth_year),
        year_or_unknown(person.death_year),
        person.owner_id
    )
}

/// `"{father} and {mother} Family (FamilyID: {id})"`.
pub fn format_family(family: &FamilyRecord) -> String {
    format!(
        "{} and {} Family (FamilyID: {})",
        parent_segment(
            family.father_owner_id,
            &family.father_given,
            &family.father_surname
        ),
        parent_segment(
            family.mother_owner_id,
            &family.mother_given,
            &family.mother_surname
        ),
        family.family_id
    )
}

/// Returns true when `name` has the shape of a current-format person label.
pub fn is_current_person_label(name: &str) -> bool {
    PERSON_LABEL_V2.is_match(name)
}

fn year_or_unknown(year: i64) -> String {
    if year == 0 {
        UNKNOWN.to_string()
    } else {
        year.to_string()
    }
}

fn parent_segment(owner_id: OwnerId, given: &str, surname: &str) -> String {
    if owner_id.is_absent() || (given.is_empty() && surname.is_empty()) {
        return UNKNOWN.to_string();
    }
    format!("{given} {surname} (OwnerID: {owner_id})")
}
