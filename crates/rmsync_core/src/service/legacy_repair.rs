//! Best-effort repair of tags written by older versions of the tool.
//!
//! # Responsibility
//! - Bind identity-less person tags under the primary root to a source
//!   person by exact label match.
//! - Rewrite identity-bearing primary tags whose name predates the current
//!   label format.
//!
//! # Invariants
//! - Never deletes a node. Unmatched nodes are logged and left alone.
//! - Store errors abort only the pass they occur in; the run continues.
//! - An `OwnerId` already bound in the primary branch is never bound twice.

use crate::config::LegacyRepair;
use crate::model::genealogy::{OwnerId, PersonRecord};
use crate::model::label::is_current_person_label;
use crate::model::tag::{TagId, DISPLAY_PROPERTY, FAMILY_PROPERTY, IDENTITY_PROPERTY};
use crate::repo::tag_repo::{TagRepoResult, TagStore};
use crate::service::destination_index::BranchIndex;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

/// Counts of nodes touched by the repair passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyRepairOutcome {
    /// Legacy nodes that received an identity property.
    pub bound: usize,
    /// Nodes renamed into the current label format.
    pub renamed: usize,
}

impl LegacyRepairOutcome {
    pub fn changed(&self) -> bool {
        self.bound > 0 || self.renamed > 0
    }
}

/// Whether the binding pass runs for this policy and branch state.
///
/// `Auto` binds only when fewer than half the source people are indexed,
/// which is what a tree written before identity properties looks like.
pub fn should_bind(policy: LegacyRepair, indexed: usize, people: usize) -> bool {
    match policy {
        LegacyRepair::Always => true,
        LegacyRepair::Never => false,
        LegacyRepair::Auto => indexed < people / 2,
    }
}

/// Runs both repair passes according to `policy`.
pub fn repair_legacy_nodes<S: TagStore + ?Sized>(
    store: &S,
    primary_root: TagId,
    people: &[PersonRecord],
    primary: &BranchIndex,
    policy: LegacyRepair,
) -> LegacyRepairOutcome {
    let mut outcome = LegacyRepairOutcome::default();
    if policy == LegacyRepair::Never {
        return outcome;
    }

    if should_bind(policy, primary.len(), people.len()) {
        match bind_legacy_nodes(store, primary_root, people, primary) {
            Ok(bound) => outcome.bound = bound,
            Err(err) => warn!(
                "event=legacy_bind module=service status=skipped error={}",
                err
            ),
        }
    }

    match normalize_labels(store, people, primary) {
        Ok(renamed) => outcome.renamed = renamed,
        Err(err) => warn!(
            "event=legacy_rename module=service status=skipped error={}",
            err
        ),
    }

    info!(
        "event=legacy_repair module=service status=ok policy={} bound={} renamed={}",
        policy, outcome.bound, outcome.renamed
    );
    outcome
}

fn bind_legacy_nodes<S: TagStore + ?Sized>(
    store: &S,
    primary_root: TagId,
    people: &[PersonRecord],
    primary: &BranchIndex,
) -> TagRepoResult<usize> {
    let by_label: HashMap<&str, &PersonRecord> = people
        .iter()
        .map(|person| (person.display_label.as_str(), person))
        .collect();
    let mut taken: HashSet<OwnerId> = primary.nodes().iter().filter_map(|n| n.owner_id).collect();

    let mut bound = 0;
    for node in store.list_children(primary_root)? {
        if !node.is_legacy() || store.get_property(node.tag_id, FAMILY_PROPERTY)?.is_some() {
            continue;
        }
        let Some(person) = by_label.get(node.display_name.as_str()) else {
            debug!(
                "event=legacy_bind module=service status=unmatched tag_id={}",
                node.tag_id
            );
            continue;
        };
        if !taken.insert(person.owner_id) {
            warn!(
                "event=legacy_bind module=service status=skipped reason=identity_taken owner_id={} tag_id={}",
                person.owner_id, node.tag_id
            );
            continue;
        }

        store.set_property(node.tag_id, IDENTITY_PROPERTY, &person.owner_id.to_string())?;
        if store.get_property(node.tag_id, DISPLAY_PROPERTY)?.is_none() {
            store.set_property(node.tag_id, DISPLAY_PROPERTY, &person.display_label)?;
        }
        bound += 1;
        debug!(
            "event=legacy_bind module=service status=ok owner_id={} tag_id={}",
            person.owner_id, node.tag_id
        );
    }
    Ok(bound)
}

fn normalize_labels<S: TagStore + ?Sized>(
    store: &S,
    people: &[PersonRecord],
    primary: &BranchIndex,
) -> TagRepoResult<usize> {
    let by_owner: HashMap<OwnerId, &PersonRecord> = people
        .iter()
        .map(|person| (person.owner_id, person))
        .collect();

    let mut renamed = 0;
    for node in primary.nodes() {
        if is_current_person_label(&node.display_name) {
            continue;
        }
        let Some(person) = node.owner_id.and_then(|owner_id| by_owner.get(&owner_id)) else {
            warn!(
                "event=legacy_rename module=service status=unmatched tag_id={}",
                node.tag_id
            );
            continue;
        };

        match store.rename_node(node.tag_id, &person.display_label) {
            Ok(()) => {}
            Err(err) if err.is_name_conflict() => {
                warn!(
                    "event=legacy_rename module=service status=skipped reason=name_conflict owner_id={} tag_id={}",
                    person.owner_id, node.tag_id
                );
                continue;
            }
            Err(err) => return Err(err),
        }
        store.set_property(node.tag_id, DISPLAY_PROPERTY, &person.display_label)?;
        renamed += 1;
    }
    Ok(renamed)
}
