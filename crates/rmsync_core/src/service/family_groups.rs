//! Family group nodes between the primary root and person nodes.
//!
//! # Invariants
//! - A family group is found by its label directly under the primary root
//!   and is created at most once per run.
//! - Every group this module hands out carries `FAMILY_PROPERTY`.

use crate::model::genealogy::{FamilyId, FamilyRecord};
use crate::model::tag::{TagId, TagKind, FAMILY_PROPERTY};
use crate::repo::tag_repo::{TagRepoResult, TagStore};
use log::info;
use std::collections::HashMap;

/// Per-run resolver from family ids to group tag ids.
pub struct FamilyGroups<'a> {
    families: &'a HashMap<FamilyId, FamilyRecord>,
    primary_root: TagId,
    resolved: HashMap<FamilyId, TagId>,
    created: usize,
}

impl<'a> FamilyGroups<'a> {
    pub fn new(families: &'a HashMap<FamilyId, FamilyRecord>, primary_root: TagId) -> Self {
        Self {
            families,
            primary_root,
            resolved: HashMap::new(),
            created: 0,
        }
    }

    /// Family record for `family_id` when it is set and known.
    pub fn resolve(&self, family_id: FamilyId) -> Option<&'a FamilyRecord> {
        if family_id.is_absent() {
            return None;
        }
        self.families.get(&family_id)
    }

    /// Number of group nodes created through this resolver.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Returns the group node for `family`, creating it when absent.
    pub fn ensure_family_group<S: TagStore + ?Sized>(
        &mut self,
        store: &S,
        family: &FamilyRecord,
    ) -> TagRepoResult<TagId> {
        if let Some(&tag_id) = self.resolved.get(&family.family_id) {
            return Ok(tag_id);
        }

        let family_value = family.family_id.to_string();
        let tag_id = match store.find_child_by_name(self.primary_root, &family.group_label)? {
            Some(existing) => {
                if store.get_property(existing, FAMILY_PROPERTY)?.as_deref()
                    != Some(family_value.as_str())
                {
                    store.set_property(existing, FAMILY_PROPERTY, &family_value)?;
                }
                existing
            }
            None => {
                let created = store.create_node(
                    &family.group_label,
                    self.primary_root,
                    TagKind::FamilyGroup,
                )?;
                store.set_property(created, FAMILY_PROPERTY, &family_value)?;
                self.created += 1;
                info!(
                    "event=family_group_created module=service status=ok family_id={} tag_id={}",
                    family.family_id, created
                );
                created
            }
        };

        self.resolved.insert(family.family_id, tag_id);
        Ok(tag_id)
    }

    /// Parent a person belongs under: their family group, else the root.
    pub fn target_parent<S: TagStore + ?Sized>(
        &mut self,
        store: &S,
        family_id: FamilyId,
    ) -> TagRepoResult<TagId> {
        match self.resolve(family_id) {
            Some(family) => self.ensure_family_group(store, family),
            None => Ok(self.primary_root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FamilyGroups;
    use crate::model::genealogy::{FamilyId, FamilyRecord, FamilyRow};
    use crate::model::tag::{TagId, TagKind, FAMILY_PROPERTY, FAMILY_ICON};
    use crate::repo::memory_tag_repo::MemoryTagStore;
    use crate::repo::tag_repo::TagStore;
    use std::collections::HashMap;

    fn families() -> HashMap<FamilyId, FamilyRecord> {
        let record = FamilyRecord::from(FamilyRow {
            family_id: 3,
            father_owner_id: 1,
            mother_owner_id: 2,
            father_given: "John".to_string(),
            father_surname: "Doe".to_string(),
            mother_given: "Mary".to_string(),
            mother_surname: "Roe".to_string(),
        });
        HashMap::from([(record.family_id, record)])
    }

    #[test]
    fn ensure_creates_once_and_marks_group() {
        let store = MemoryTagStore::new();
        let root = store
            .create_node("RootsMagic", TagId::ROOT, TagKind::Container)
            .unwrap();
        let families = families();
        let mut groups = FamilyGroups::new(&families, root);

        let first = groups.target_parent(&store, FamilyId(3)).unwrap();
        let second = groups.target_parent(&store, FamilyId(3)).unwrap();

        assert_eq!(first, second);
        assert_eq!(groups.created(), 1);
        assert_eq!(store.list_children(root).unwrap().len(), 1);
        assert_eq!(
            store.get_property(first, FAMILY_PROPERTY).unwrap().as_deref(),
            Some("3")
        );
        let icon = store
            .dump()
            .tags
            .into_iter()
            .find(|row| row.id == first)
            .and_then(|row| row.iconkde);
        assert_eq!(icon.as_deref(), Some(FAMILY_ICON));
    }

    #[test]
    fn existing_group_is_reused_across_runs() {
        let store = MemoryTagStore::new();
        let root = store
            .create_node("RootsMagic", TagId::ROOT, TagKind::Container)
            .unwrap();
        let families = families();

        let created = FamilyGroups::new(&families, root)
            .target_parent(&store, FamilyId(3))
            .unwrap();
        let mut next_run = FamilyGroups::new(&families, root);
        let reused = next_run.target_parent(&store, FamilyId(3)).unwrap();

        assert_eq!(created, reused);
        assert_eq!(next_run.created(), 0);
    }

    #[test]
    fn unresolvable_family_targets_root() {
        let store = MemoryTagStore::new();
        let root = store
            .create_node("RootsMagic", TagId::ROOT, TagKind::Container)
            .unwrap();
        let families = families();
        let mut groups = FamilyGroups::new(&families, root);

        assert_eq!(groups.target_parent(&store, FamilyId(0)).unwrap(), root);
        assert_eq!(groups.target_parent(&store, FamilyId(99)).unwrap(), root);
        assert!(store.list_children(root).unwrap().is_empty());
    }
}
