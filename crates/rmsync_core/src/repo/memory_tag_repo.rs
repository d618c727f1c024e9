//! In-memory tag store.
//!
//! Mirrors the digiKam constraints (`(name, parent)` uniqueness, property
//! rows deleted with their tag) without any SQL. Transactions are only
//! tracked as a flag: `rollback` does not undo changes, so callers must
//! restore a checkpoint, which `TransactionGuard` does when
//! `native_rollback()` is false.

use crate::model::genealogy::OwnerId;
use crate::model::tag::{TagId, TagKind, TagNode, IDENTITY_PROPERTY};
use crate::repo::tag_repo::{
    PropertyRow, TagCheckpoint, TagRepoError, TagRepoResult, TagRow, TagStore,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
struct MemoryTag {
    pid: TagId,
    name: String,
    iconkde: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tags: BTreeMap<TagId, MemoryTag>,
    properties: Vec<PropertyRow>,
    next_id: i64,
    in_transaction: bool,
}

impl MemoryState {
    fn name_taken(&self, parent: TagId, name: &str, except: Option<TagId>) -> bool {
        self.tags
            .iter()
            .any(|(id, tag)| Some(*id) != except && tag.pid == parent && tag.name == name)
    }

    fn first_property(&self, id: TagId, key: &str) -> Option<String> {
        self.properties
            .iter()
            .find(|row| row.tag_id == id && row.property == key)
            .and_then(|row| row.value.clone())
    }

    fn has_property(&self, id: TagId, key: &str) -> bool {
        self.properties
            .iter()
            .any(|row| row.tag_id == id && row.property == key)
    }

    fn node(&self, id: TagId, tag: &MemoryTag) -> TagNode {
        TagNode {
            tag_id: id,
            display_name: tag.name.clone(),
            parent_id: tag.pid,
            owner_id: self
                .first_property(id, IDENTITY_PROPERTY)
                .and_then(|value| OwnerId::parse_property(&value)),
        }
    }

    fn subtree(&self, root: &str) -> BTreeSet<TagId> {
        let mut scope = BTreeSet::new();
        let mut frontier: Vec<TagId> = self
            .tags
            .iter()
            .filter(|(_, tag)| tag.pid == TagId::ROOT && tag.name == root)
            .map(|(id, _)| *id)
            .collect();
        while let Some(current) = frontier.pop() {
            if !scope.insert(current) {
                continue;
            }
            frontier.extend(
                self.tags
                    .iter()
                    .filter(|(_, tag)| tag.pid == current)
                    .map(|(id, _)| *id),
            );
        }
        scope
    }
}

/// Tag store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    state: RefCell<MemoryState>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tags in the store.
    pub fn len(&self) -> usize {
        self.state.borrow().tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().tags.is_empty()
    }

    /// Full copy of every tag and property row, ordered by tag id.
    pub fn dump(&self) -> TagCheckpoint {
        let state = self.state.borrow();
        TagCheckpoint {
            roots: Vec::new(),
            tags: state
                .tags
                .iter()
                .map(|(id, tag)| TagRow {
                    id: *id,
                    pid: tag.pid,
                    name: tag.name.clone(),
                    icon: None,
                    iconkde: tag.iconkde.clone(),
                })
                .collect(),
            properties: state.properties.clone(),
        }
    }
}

impl TagStore for MemoryTagStore {
    fn find_node_by_name(&self, name: &str) -> TagRepoResult<Option<TagId>> {
        self.find_child_by_name(TagId::ROOT, name)
    }

    fn find_child_by_name(&self, parent: TagId, name: &str) -> TagRepoResult<Option<TagId>> {
        let state = self.state.borrow();
        Ok(state
            .tags
            .iter()
            .find(|(_, tag)| tag.pid == parent && tag.name == name)
            .map(|(id, _)| *id))
    }

    fn get_node(&self, id: TagId) -> TagRepoResult<Option<TagNode>> {
        let state = self.state.borrow();
        Ok(state.tags.get(&id).map(|tag| state.node(id, tag)))
    }

    fn create_node(&self, name: &str, parent: TagId, kind: TagKind) -> TagRepoResult<TagId> {
        let mut state = self.state.borrow_mut();
        if state.name_taken(parent, name, None) {
            return Err(TagRepoError::NameConflict {
                parent,
                name: name.to_string(),
            });
        }
        state.next_id += 1;
        let id = TagId(state.next_id);
        state.tags.insert(
            id,
            MemoryTag {
                pid: parent,
                name: name.to_string(),
                iconkde: kind.icon_name().map(str::to_string),
            },
        );
        Ok(id)
    }

    fn rename_node(&self, id: TagId, name: &str) -> TagRepoResult<()> {
        let mut state = self.state.borrow_mut();
        let parent = state
            .tags
            .get(&id)
            .map(|tag| tag.pid)
            .ok_or(TagRepoError::NodeNotFound(id))?;
        if state.name_taken(parent, name, Some(id)) {
            return Err(TagRepoError::NameConflict {
                parent,
                name: name.to_string(),
            });
        }
        if let Some(tag) = state.tags.get_mut(&id) {
            tag.name = name.to_string();
        }
        Ok(())
    }

    fn reparent_node(&self, id: TagId, parent: TagId) -> TagRepoResult<()> {
        let mut state = self.state.borrow_mut();
        let name = state
            .tags
            .get(&id)
            .map(|tag| tag.name.clone())
            .ok_or(TagRepoError::NodeNotFound(id))?;
        if state.name_taken(parent, &name, Some(id)) {
            return Err(TagRepoError::NameConflict { parent, name });
        }
        if let Some(tag) = state.tags.get_mut(&id) {
            tag.pid = parent;
        }
        Ok(())
    }

    fn delete_node(&self, id: TagId) -> TagRepoResult<()> {
        let mut state = self.state.borrow_mut();
        if state.tags.remove(&id).is_none() {
            return Err(TagRepoError::NodeNotFound(id));
        }
        state.properties.retain(|row| row.tag_id != id);
        Ok(())
    }

    fn get_property(&self, id: TagId, key: &str) -> TagRepoResult<Option<String>> {
        Ok(self.state.borrow().first_property(id, key))
    }

    fn set_property(&self, id: TagId, key: &str, value: &str) -> TagRepoResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.tags.contains_key(&id) {
            return Err(TagRepoError::NodeNotFound(id));
        }
        state
            .properties
            .retain(|row| !(row.tag_id == id && row.property == key));
        state.properties.push(PropertyRow {
            tag_id: id,
            property: key.to_string(),
            value: Some(value.to_string()),
        });
        Ok(())
    }

    fn list_children(&self, parent: TagId) -> TagRepoResult<Vec<TagNode>> {
        let state = self.state.borrow();
        Ok(state
            .tags
            .iter()
            .filter(|(_, tag)| tag.pid == parent)
            .map(|(id, tag)| state.node(*id, tag))
            .collect())
    }

    fn list_children_with_property(&self, parent: TagId, key: &str) -> TagRepoResult<Vec<TagId>> {
        let state = self.state.borrow();
        Ok(state
            .tags
            .iter()
            .filter(|(id, tag)| tag.pid == parent && state.has_property(**id, key))
            .map(|(id, _)| *id)
            .collect())
    }

    fn list_children_without_property(
        &self,
        parent: TagId,
        key: &str,
    ) -> TagRepoResult<Vec<TagId>> {
        let state = self.state.borrow();
        Ok(state
            .tags
            .iter()
            .filter(|(id, tag)| tag.pid == parent && !state.has_property(**id, key))
            .map(|(id, _)| *id)
            .collect())
    }

    fn begin_transaction(&self) -> TagRepoResult<()> {
        let mut state = self.state.borrow_mut();
        if state.in_transaction {
            return Err(TagRepoError::TransactionState("transaction already open"));
        }
        state.in_transaction = true;
        Ok(())
    }

    fn commit(&self) -> TagRepoResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.in_transaction {
            return Err(TagRepoError::TransactionState("commit without open transaction"));
        }
        state.in_transaction = false;
        Ok(())
    }

    fn rollback(&self) -> TagRepoResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.in_transaction {
            return Err(TagRepoError::TransactionState(
                "rollback without open transaction",
            ));
        }
        state.in_transaction = false;
        Ok(())
    }

    fn native_rollback(&self) -> bool {
        false
    }

    fn checkpoint(&self, roots: &[&str]) -> TagRepoResult<TagCheckpoint> {
        let state = self.state.borrow();
        let mut checkpoint = TagCheckpoint {
            roots: roots.iter().map(|root| root.to_string()).collect(),
            ..TagCheckpoint::default()
        };
        for root in roots {
            let scope = state.subtree(root);
            checkpoint
                .tags
                .extend(scope.iter().filter_map(|id| {
                    state.tags.get(id).map(|tag| TagRow {
                        id: *id,
                        pid: tag.pid,
                        name: tag.name.clone(),
                        icon: None,
                        iconkde: tag.iconkde.clone(),
                    })
                }));
            checkpoint.properties.extend(
                state
                    .properties
                    .iter()
                    .filter(|row| scope.contains(&row.tag_id))
                    .cloned(),
            );
        }
        Ok(checkpoint)
    }

    fn restore(&self, checkpoint: &TagCheckpoint) -> TagRepoResult<()> {
        let mut state = self.state.borrow_mut();
        for root in &checkpoint.roots {
            let scope = state.subtree(root);
            state.tags.retain(|id, _| !scope.contains(id));
            state.properties.retain(|row| !scope.contains(&row.tag_id));
        }
        for row in &checkpoint.tags {
            if state.tags.contains_key(&row.id) {
                return Err(TagRepoError::InvalidData(format!(
                    "checkpoint tag {} collides with a live tag",
                    row.id
                )));
            }
            state.tags.insert(
                row.id,
                MemoryTag {
                    pid: row.pid,
                    name: row.name.clone(),
                    iconkde: row.iconkde.clone(),
                },
            );
            state.next_id = state.next_id.max(row.id.0);
        }
        state.properties.extend(checkpoint.properties.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryTagStore;
    use crate::model::tag::{TagId, TagKind, IDENTITY_PROPERTY};
    use crate::repo::tag_repo::TagStore;

    #[test]
    fn enforces_unique_name_per_parent() {
        let store = MemoryTagStore::new();
        let root = store
            .create_node("RootsMagic", TagId::ROOT, TagKind::Container)
            .unwrap();
        let other = store
            .create_node("Lost & Found", TagId::ROOT, TagKind::Container)
            .unwrap();
        let jane = store.create_node("Jane", root, TagKind::Person).unwrap();
        store.create_node("Jane", other, TagKind::Person).unwrap();

        assert!(store
            .create_node("Jane", root, TagKind::Person)
            .unwrap_err()
            .is_name_conflict());
        assert!(store.reparent_node(jane, other).unwrap_err().is_name_conflict());
    }

    #[test]
    fn rollback_is_not_native_and_restore_recovers() {
        let store = MemoryTagStore::new();
        let root = store
            .create_node("RootsMagic", TagId::ROOT, TagKind::Container)
            .unwrap();
        let jane = store.create_node("Jane", root, TagKind::Person).unwrap();
        store.set_property(jane, IDENTITY_PROPERTY, "7").unwrap();
        let before = store.dump();

        let checkpoint = store.checkpoint(&["RootsMagic"]).unwrap();
        store.begin_transaction().unwrap();
        store.delete_node(jane).unwrap();
        store.create_node("John", root, TagKind::Person).unwrap();
        store.rollback().unwrap();

        assert!(!store.native_rollback());
        assert_ne!(store.dump(), before);

        store.restore(&checkpoint).unwrap();
        assert_eq!(store.dump(), before);
    }
}
