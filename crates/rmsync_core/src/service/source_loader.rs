//! Loads the genealogy snapshot one run reconciles against.
//!
//! # Invariants
//! - Either the whole snapshot loads or an error is returned; partial
//!   results are never handed out.
//! - At most one record per `OwnerId`; a later row replaces an earlier one
//!   in place.

use crate::model::genealogy::{FamilyId, FamilyRecord, OwnerId, PersonRecord};
use crate::repo::genealogy_repo::{GenealogyResult, GenealogySource};
use log::{debug, info};
use std::collections::HashMap;
use std::time::Instant;

/// People and families read for one run.
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    /// People in source order.
    pub people: Vec<PersonRecord>,
    pub families: HashMap<FamilyId, FamilyRecord>,
}

/// Reads every primary-name person and every family from `source`.
pub fn load_source<G: GenealogySource + ?Sized>(source: &G) -> GenealogyResult<SourceData> {
    let started_at = Instant::now();

    let rows = source.list_primary_people()?;
    let mut people: Vec<PersonRecord> = Vec::with_capacity(rows.len());
    let mut positions: HashMap<OwnerId, usize> = HashMap::with_capacity(rows.len());
    for row in rows {
        let record = PersonRecord::from(row);
        match positions.get(&record.owner_id) {
            Some(&position) => {
                debug!(
                    "event=source_duplicate_owner module=service status=replaced owner_id={}",
                    record.owner_id
                );
                people[position] = record;
            }
            None => {
                positions.insert(record.owner_id, people.len());
                people.push(record);
            }
        }
    }

    let families = source
        .list_families()?
        .into_iter()
        .map(FamilyRecord::from)
        .map(|family| (family.family_id, family))
        .collect::<HashMap<_, _>>();

    info!(
        "event=source_load module=service status=ok people={} families={} duration_ms={}",
        people.len(),
        families.len(),
        started_at.elapsed().as_millis()
    );
    Ok(SourceData { people, families })
}

#[cfg(test)]
mod tests {
    use super::load_source;
    use crate::model::genealogy::{FamilyId, FamilyRow, OwnerId, PersonRow};
    use crate::repo::genealogy_repo::{GenealogyResult, GenealogySource};

    struct FixedSource {
        people: Vec<PersonRow>,
        families: Vec<FamilyRow>,
    }

    impl GenealogySource for FixedSource {
        fn list_primary_people(&self) -> GenealogyResult<Vec<PersonRow>> {
            Ok(self.people.clone())
        }

        fn list_families(&self) -> GenealogyResult<Vec<FamilyRow>> {
            Ok(self.families.clone())
        }
    }

    fn person(owner_id: i64, given: &str, family_id: i64) -> PersonRow {
        PersonRow {
            owner_id,
            given_name: given.to_string(),
            surname: "Doe".to_string(),
            birth_year: 1900,
            death_year: 0,
            family_id,
        }
    }

    #[test]
    fn later_duplicate_owner_replaces_earlier_in_place() {
        let source = FixedSource {
            people: vec![person(1, "Jane", 0), person(2, "John", 0), person(1, "Janet", 0)],
            families: Vec::new(),
        };

        let data = load_source(&source).unwrap();

        assert_eq!(data.people.len(), 2);
        assert_eq!(data.people[0].owner_id, OwnerId(1));
        assert_eq!(data.people[0].given_name, "Janet");
        assert_eq!(data.people[1].owner_id, OwnerId(2));
    }

    #[test]
    fn families_are_keyed_by_family_id() {
        let source = FixedSource {
            people: vec![person(1, "Jane", 5), person(2, "John", 9), person(3, "Jim", 0)],
            families: vec![FamilyRow {
                family_id: 5,
                father_owner_id: 2,
                mother_owner_id: 0,
                father_given: "John".to_string(),
                father_surname: "Doe".to_string(),
                mother_given: String::new(),
                mother_surname: String::new(),
            }],
        };

        let data = load_source(&source).unwrap();

        assert_eq!(data.families.len(), 1);
        let family = &data.families[&FamilyId(5)];
        assert_eq!(family.father_owner_id, OwnerId(2));
        assert_eq!(data.people[0].family_id, FamilyId(5));
        assert!(!data.families.contains_key(&data.people[1].family_id));
    }
}
