//! Removes extra nodes so each identity is carried by one node.
//!
//! # Invariants
//! - A primary copy always wins over a catch-all copy.
//! - Within one branch the indexed node survives and its shadowed copies go.
//! - Deletion takes the node's properties with it.

use crate::model::tag::TagNode;
use crate::repo::tag_repo::{TagRepoResult, TagStore};
use crate::service::destination_index::BranchIndex;
use log::info;

/// Deletes shadowed primary copies and every catch-all node whose identity
/// is also in `primary`.
///
/// Returns the number of nodes removed. Both indices must be fresh; callers
/// reload them before each pass.
pub fn resolve_duplicates<S: TagStore + ?Sized>(
    store: &S,
    primary: &BranchIndex,
    catch_all: &BranchIndex,
) -> TagRepoResult<usize> {
    let mut removed = 0;
    for node in primary.shadowed() {
        remove(store, node, "primary")?;
        removed += 1;
    }
    for node in catch_all.nodes().into_iter().chain(catch_all.shadowed()) {
        let Some(owner_id) = node.owner_id else {
            continue;
        };
        if !primary.contains(owner_id) {
            continue;
        }
        remove(store, node, "catch_all")?;
        removed += 1;
    }
    Ok(removed)
}

/// Deletes shadowed catch-all copies of identities absent from `primary`.
///
/// Runs after reconciliation so a rescue can still pick the surviving copy.
pub fn collapse_catch_all<S: TagStore + ?Sized>(
    store: &S,
    primary: &BranchIndex,
    catch_all: &BranchIndex,
) -> TagRepoResult<usize> {
    let mut removed = 0;
    for node in catch_all.shadowed() {
        if node.owner_id.is_some_and(|owner_id| primary.contains(owner_id)) {
            continue;
        }
        remove(store, node, "catch_all")?;
        removed += 1;
    }
    Ok(removed)
}

fn remove<S: TagStore + ?Sized>(store: &S, node: &TagNode, branch: &str) -> TagRepoResult<()> {
    store.delete_node(node.tag_id)?;
    info!(
        "event=duplicate_removed module=service status=ok branch={} owner_id={} tag_id={}",
        branch,
        node.owner_id.map(|id| id.to_string()).unwrap_or_default(),
        node.tag_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{collapse_catch_all, resolve_duplicates};
    use crate::model::genealogy::OwnerId;
    use crate::model::tag::{TagId, TagKind, DISPLAY_PROPERTY, IDENTITY_PROPERTY};
    use crate::repo::memory_tag_repo::MemoryTagStore;
    use crate::repo::tag_repo::TagStore;
    use crate::service::destination_index::{load_branch_index, load_primary_index};

    #[test]
    fn deletes_only_catch_all_copy_of_shared_identity() {
        let store = MemoryTagStore::new();
        let primary_root = store
            .create_node("RootsMagic", TagId::ROOT, TagKind::Container)
            .unwrap();
        let catch_all_root = store
            .create_node("Lost & Found", TagId::ROOT, TagKind::Container)
            .unwrap();
        let kept = store.create_node("Jane", primary_root, TagKind::Person).unwrap();
        store.set_property(kept, IDENTITY_PROPERTY, "7").unwrap();
        let copy = store.create_node("Jane", catch_all_root, TagKind::Person).unwrap();
        store.set_property(copy, IDENTITY_PROPERTY, "7").unwrap();
        store.set_property(copy, DISPLAY_PROPERTY, "Jane").unwrap();
        let lone = store.create_node("John", catch_all_root, TagKind::Person).unwrap();
        store.set_property(lone, IDENTITY_PROPERTY, "8").unwrap();

        let primary = load_primary_index(&store, "RootsMagic").unwrap();
        let catch_all = load_branch_index(&store, "Lost & Found").unwrap();
        let removed = resolve_duplicates(&store, &primary, &catch_all).unwrap();

        assert_eq!(removed, 1);
        assert!(store.get_node(copy).unwrap().is_none());
        assert!(store.get_property(copy, DISPLAY_PROPERTY).unwrap().is_none());
        assert!(store.get_node(kept).unwrap().is_some());

        let catch_all = load_branch_index(&store, "Lost & Found").unwrap();
        assert_eq!(catch_all.len(), 1);
        assert!(catch_all.contains(OwnerId(8)));
        assert_eq!(resolve_duplicates(&store, &primary, &catch_all).unwrap(), 0);
    }

    #[test]
    fn shadowed_copies_are_removed_per_branch() {
        let store = MemoryTagStore::new();
        let primary_root = store
            .create_node("RootsMagic", TagId::ROOT, TagKind::Container)
            .unwrap();
        let catch_all_root = store
            .create_node("Lost & Found", TagId::ROOT, TagKind::Container)
            .unwrap();
        let node = |parent: TagId, name: &str, owner: &str| {
            let id = store.create_node(name, parent, TagKind::Person).unwrap();
            store.set_property(id, IDENTITY_PROPERTY, owner).unwrap();
            id
        };
        let jane = node(primary_root, "Jane A", "7");
        let jane_copy = node(primary_root, "Jane B", "7");
        let jane_stray = node(catch_all_root, "Jane C", "7");
        let jane_stray_copy = node(catch_all_root, "Jane D", "7");
        let bob = node(catch_all_root, "Bob A", "5");
        let bob_copy = node(catch_all_root, "Bob B", "5");

        let primary = load_primary_index(&store, "RootsMagic").unwrap();
        let catch_all = load_branch_index(&store, "Lost & Found").unwrap();
        assert_eq!(resolve_duplicates(&store, &primary, &catch_all).unwrap(), 3);
        for gone in [jane_copy, jane_stray, jane_stray_copy] {
            assert!(store.get_node(gone).unwrap().is_none());
        }
        assert!(store.get_node(jane).unwrap().is_some());
        assert!(store.get_node(bob_copy).unwrap().is_some());

        let catch_all = load_branch_index(&store, "Lost & Found").unwrap();
        assert_eq!(collapse_catch_all(&store, &primary, &catch_all).unwrap(), 1);
        assert!(store.get_node(bob).unwrap().is_some());
        assert!(store.get_node(bob_copy).unwrap().is_none());
        assert!(load_branch_index(&store, "Lost & Found")
            .unwrap()
            .shadowed()
            .is_empty());
    }
}
