//! Moves primary nodes no current person claimed into the catch-all branch.
//!
//! # Invariants
//! - Nodes are re-parented, never deleted, so photo associations survive.
//! - A name collision in the catch-all branch fails that node only.

use crate::model::genealogy::OwnerId;
use crate::model::tag::TagId;
use crate::repo::tag_repo::{TagRepoResult, TagStore};
use crate::service::destination_index::BranchIndex;
use crate::service::reconciler::PersonFailure;
use log::{info, warn};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub moved: usize,
    pub failed: Vec<PersonFailure>,
}

/// Re-parents every unclaimed node of `primary` under `catch_all_root`.
pub fn sweep_orphans<S: TagStore + ?Sized>(
    store: &S,
    primary: &BranchIndex,
    claimed: &HashSet<TagId>,
    catch_all_root: TagId,
) -> TagRepoResult<SweepOutcome> {
    let mut outcome = SweepOutcome::default();
    for node in primary.nodes() {
        if claimed.contains(&node.tag_id) {
            continue;
        }
        let owner_id = node.owner_id.unwrap_or(OwnerId(0));
        match store.reparent_node(node.tag_id, catch_all_root) {
            Ok(()) => {
                outcome.moved += 1;
                info!(
                    "event=orphan_moved module=service status=ok owner_id={} tag_id={}",
                    owner_id, node.tag_id
                );
            }
            Err(err) if err.is_name_conflict() => {
                warn!(
                    "event=orphan_moved module=service status=error owner_id={} tag_id={} error={}",
                    owner_id, node.tag_id, err
                );
                outcome.failed.push(PersonFailure {
                    owner_id,
                    label: node.display_name.clone(),
                    reason: format!("orphan move failed: {err}"),
                });
            }
            Err(err) => return Err(err),
        }
    }
    Ok(outcome)
}
