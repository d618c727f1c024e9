//! Identity-keyed snapshot of one destination branch.
//!
//! # Responsibility
//! - Map `OwnerId` to the tag node carrying it under a branch root.
//!
//! # Invariants
//! - Read-only; never mutates the store.
//! - Legacy nodes (no identity property) are not indexed.
//! - When several nodes carry one identity, the lowest tag id is indexed and
//!   the others are kept as shadowed copies.
//! - A missing branch root yields an empty index.
//! - The primary branch also indexes people one level down, inside family
//!   group nodes.

use crate::model::genealogy::OwnerId;
use crate::model::tag::{TagId, TagNode, FAMILY_PROPERTY};
use crate::repo::tag_repo::{TagRepoResult, TagStore};
use log::warn;
use std::collections::HashMap;

/// Identity map of one branch.
#[derive(Debug, Clone, Default)]
pub struct BranchIndex {
    root: Option<TagId>,
    nodes: HashMap<OwnerId, TagNode>,
    shadowed: Vec<TagNode>,
}

impl BranchIndex {
    pub fn get(&self, owner_id: OwnerId) -> Option<&TagNode> {
        self.nodes.get(&owner_id)
    }

    pub fn contains(&self, owner_id: OwnerId) -> bool {
        self.nodes.contains_key(&owner_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Indexed nodes ordered by tag id.
    pub fn nodes(&self) -> Vec<&TagNode> {
        let mut nodes: Vec<&TagNode> = self.nodes.values().collect();
        nodes.sort_by_key(|node| node.tag_id);
        nodes
    }

    /// Extra nodes sharing an identity with an indexed node, by tag id.
    pub fn shadowed(&self) -> Vec<&TagNode> {
        let mut nodes: Vec<&TagNode> = self.shadowed.iter().collect();
        nodes.sort_by_key(|node| node.tag_id);
        nodes
    }

    fn insert(&mut self, branch: &str, node: TagNode) {
        let Some(owner_id) = node.owner_id else {
            return;
        };
        let shadowed = match self.nodes.get_mut(&owner_id) {
            Some(kept) if node.tag_id < kept.tag_id => std::mem::replace(kept, node),
            Some(_) => node,
            None => {
                self.nodes.insert(owner_id, node);
                return;
            }
        };
        warn!(
            "event=index_duplicate_identity module=service status=shadowed branch={:?} owner_id={} shadowed_tag_id={}",
            branch, owner_id, shadowed.tag_id
        );
        self.shadowed.push(shadowed);
    }
}

/// Indexes identity-bearing direct children of the root named `root_name`.
pub fn load_branch_index<S: TagStore + ?Sized>(
    store: &S,
    root_name: &str,
) -> TagRepoResult<BranchIndex> {
    let Some(root) = store.find_node_by_name(root_name)? else {
        return Ok(BranchIndex::default());
    };
    let mut index = BranchIndex {
        root: Some(root),
        ..BranchIndex::default()
    };
    for node in store.list_children(root)? {
        index.insert(root_name, node);
    }
    Ok(index)
}

/// Like `load_branch_index`, plus identity-bearing children of family
/// groups sitting directly under the root.
pub fn load_primary_index<S: TagStore + ?Sized>(
    store: &S,
    root_name: &str,
) -> TagRepoResult<BranchIndex> {
    let mut index = load_branch_index(store, root_name)?;
    let Some(root) = index.root else {
        return Ok(index);
    };
    for group in store.list_children_with_property(root, FAMILY_PROPERTY)? {
        for node in store.list_children(group)? {
            index.insert(root_name, node);
        }
    }
    Ok(index)
}
