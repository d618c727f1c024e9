//! Per-person reconciliation between the source and the primary branch.
//!
//! # Responsibility
//! - Decide, per person, whether their node is updated, created, already
//!   present, rescued from the catch-all branch, or failed.
//! - Apply that decision to the tag store.
//!
//! # Invariants
//! - Identity lives in `IDENTITY_PROPERTY`; a matched node keeps its
//!   `TagId` and identity while being renamed or regrouped.
//! - All matched people are processed before any create or rescue.
//! - Name conflicts never abort the run: they trigger a rescue or become a
//!   `PersonFailure`. Any other store error is returned to the caller.
//! - A node already inside a family group is not moved again when the
//!   person's family changes.

use crate::model::genealogy::{FamilyRecord, OwnerId, PersonRecord};
use crate::model::tag::{TagId, TagKind, TagNode, DISPLAY_PROPERTY, IDENTITY_PROPERTY};
use crate::repo::tag_repo::{TagRepoError, TagRepoResult, TagStore};
use crate::service::destination_index::BranchIndex;
use crate::service::family_groups::FamilyGroups;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Where one person ended up after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonState {
    Unseen,
    Matched,
    Created,
    /// Identical node already existed under the target parent.
    AlreadyPresent,
    Rescued,
    Failed,
}

/// Pure decision for one person, computed before any mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonPlan {
    /// Person is indexed in the primary branch.
    Update {
        node: TagNode,
        rename: bool,
    },
    /// Person has no primary node yet.
    Place,
}

/// A person the run could neither place nor update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonFailure {
    pub owner_id: OwnerId,
    pub label: String,
    pub reason: String,
}

/// Final state of one source person, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonStatus {
    pub owner_id: OwnerId,
    pub state: PersonState,
}

/// Aggregate result of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    pub rescued: usize,
    pub already_present: usize,
    /// Tag ids owned by a current source person.
    pub claimed: HashSet<TagId>,
    pub failed: Vec<PersonFailure>,
    pub states: HashMap<OwnerId, PersonState>,
}

impl ReconcileOutcome {
    /// States of `people` in source order.
    pub fn statuses(&self, people: &[PersonRecord]) -> Vec<PersonStatus> {
        people
            .iter()
            .map(|person| PersonStatus {
                owner_id: person.owner_id,
                state: self
                    .states
                    .get(&person.owner_id)
                    .copied()
                    .unwrap_or(PersonState::Unseen),
            })
            .collect()
    }

    fn settle(&mut self, person: &PersonRecord, state: PersonState) {
        self.states.insert(person.owner_id, state);
    }

    fn fail(&mut self, person: &PersonRecord, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(
            "event=person_failed module=service status=error owner_id={} reason={:?}",
            person.owner_id, reason
        );
        self.failed.push(PersonFailure {
            owner_id: person.owner_id,
            label: person.display_label.clone(),
            reason,
        });
        self.settle(person, PersonState::Failed);
    }
}

/// Decides what to do for `person` given the primary index.
pub fn plan_person(person: &PersonRecord, primary: &BranchIndex) -> PersonPlan {
    match primary.get(person.owner_id) {
        Some(node) => PersonPlan::Update {
            node: node.clone(),
            rename: node.display_name != person.display_label,
        },
        None => PersonPlan::Place,
    }
}

/// True when a matched node sits directly under the root but its person
/// belongs to a resolvable family.
pub fn needs_regroup(node: &TagNode, primary_root: TagId, family: Option<&FamilyRecord>) -> bool {
    family.is_some() && node.parent_id == primary_root
}

enum CreateResult {
    Created(TagId),
    AlreadyPresent(TagId),
    Blocked(&'static str),
}

/// Applies person plans to one tag store.
pub struct Reconciler<'a, S: TagStore + ?Sized> {
    store: &'a S,
    primary_root: TagId,
    groups: FamilyGroups<'a>,
}

impl<'a, S: TagStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, primary_root: TagId, groups: FamilyGroups<'a>) -> Self {
        Self {
            store,
            primary_root,
            groups,
        }
    }

    /// Family groups created while reconciling.
    pub fn groups_created(&self) -> usize {
        self.groups.created()
    }

    /// Runs the update pass, then the create/rescue pass, over `people`.
    pub fn reconcile(
        &mut self,
        people: &[PersonRecord],
        primary: &BranchIndex,
        catch_all: &BranchIndex,
    ) -> TagRepoResult<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::default();
        let mut pending = Vec::new();

        for person in people {
            outcome.settle(person, PersonState::Unseen);
            match plan_person(person, primary) {
                PersonPlan::Update { node, rename } => {
                    self.update_matched(person, &node, rename, &mut outcome)?;
                }
                PersonPlan::Place => pending.push(person),
            }
        }

        for person in pending {
            self.place(person, catch_all, &mut outcome)?;
        }

        info!(
            "event=reconcile module=service status=ok people={} created={} updated={} rescued={} already_present={} failed={}",
            people.len(),
            outcome.created,
            outcome.updated,
            outcome.rescued,
            outcome.already_present,
            outcome.failed.len()
        );
        Ok(outcome)
    }

    fn update_matched(
        &mut self,
        person: &PersonRecord,
        node: &TagNode,
        rename: bool,
        outcome: &mut ReconcileOutcome,
    ) -> TagRepoResult<()> {
        outcome.claimed.insert(node.tag_id);
        let mut changed = false;

        if rename {
            match self.rename_with_display(node.tag_id, &person.display_label) {
                Ok(()) => {
                    changed = true;
                    debug!(
                        "event=person_renamed module=service status=ok owner_id={} tag_id={}",
                        person.owner_id, node.tag_id
                    );
                }
                Err(err) if err.is_name_conflict() => {
                    outcome.fail(person, err.to_string());
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }

        let family = self.groups.resolve(person.family_id);
        if needs_regroup(node, self.primary_root, family) {
            let parent = self.groups.target_parent(self.store, person.family_id)?;
            match self.store.reparent_node(node.tag_id, parent) {
                Ok(()) => {
                    changed = true;
                    debug!(
                        "event=person_regrouped module=service status=ok owner_id={} tag_id={} parent_id={}",
                        person.owner_id, node.tag_id, parent
                    );
                }
                Err(err) if err.is_name_conflict() => {
                    outcome.fail(person, err.to_string());
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }

        if changed {
            outcome.updated += 1;
        }
        outcome.settle(person, PersonState::Matched);
        Ok(())
    }

    fn place(
        &mut self,
        person: &PersonRecord,
        catch_all: &BranchIndex,
        outcome: &mut ReconcileOutcome,
    ) -> TagRepoResult<()> {
        let parent = self.groups.target_parent(self.store, person.family_id)?;

        let reason = match self.try_create(person, parent, catch_all)? {
            CreateResult::Created(tag_id) => {
                outcome.claimed.insert(tag_id);
                outcome.created += 1;
                outcome.settle(person, PersonState::Created);
                debug!(
                    "event=person_created module=service status=ok owner_id={} tag_id={}",
                    person.owner_id, tag_id
                );
                return Ok(());
            }
            CreateResult::AlreadyPresent(tag_id) => {
                outcome.claimed.insert(tag_id);
                outcome.already_present += 1;
                outcome.settle(person, PersonState::AlreadyPresent);
                return Ok(());
            }
            CreateResult::Blocked(reason) => reason,
        };

        let Some(stray) = catch_all.get(person.owner_id) else {
            outcome.fail(person, format!("create blocked by {reason}; nothing to rescue"));
            return Ok(());
        };

        match self.rescue(person, stray, parent) {
            Ok(()) => {
                outcome.claimed.insert(stray.tag_id);
                outcome.rescued += 1;
                outcome.settle(person, PersonState::Rescued);
                info!(
                    "event=person_rescued module=service status=ok owner_id={} tag_id={}",
                    person.owner_id, stray.tag_id
                );
                Ok(())
            }
            Err(err) if err.is_name_conflict() => {
                outcome.fail(person, format!("rescue failed: {err}"));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn try_create(
        &self,
        person: &PersonRecord,
        parent: TagId,
        catch_all: &BranchIndex,
    ) -> TagRepoResult<CreateResult> {
        let label = person.display_label.as_str();

        if let Some(existing) = self.store.find_child_by_name(parent, label)? {
            let same_identity = self
                .store
                .get_node(existing)?
                .and_then(|node| node.owner_id)
                == Some(person.owner_id);
            if same_identity {
                return Ok(CreateResult::AlreadyPresent(existing));
            }
            return Ok(CreateResult::Blocked("name conflict"));
        }

        if catch_all.contains(person.owner_id) {
            return Ok(CreateResult::Blocked("catch-all identity"));
        }

        let tag_id = match self.store.create_node(label, parent, TagKind::Person) {
            Ok(tag_id) => tag_id,
            Err(TagRepoError::NameConflict { .. }) => {
                return Ok(CreateResult::Blocked("name conflict"));
            }
            Err(err) => return Err(err),
        };
        self.store
            .set_property(tag_id, IDENTITY_PROPERTY, &person.owner_id.to_string())?;
        self.store.set_property(tag_id, DISPLAY_PROPERTY, label)?;
        Ok(CreateResult::Created(tag_id))
    }

    fn rescue(&self, person: &PersonRecord, stray: &TagNode, parent: TagId) -> TagRepoResult<()> {
        self.store.reparent_node(stray.tag_id, parent)?;
        if stray.display_name != person.display_label {
            self.rename_with_display(stray.tag_id, &person.display_label)?;
        }
        if self
            .store
            .get_property(stray.tag_id, IDENTITY_PROPERTY)?
            .is_none()
        {
            self.store
                .set_property(stray.tag_id, IDENTITY_PROPERTY, &person.owner_id.to_string())?;
        }
        if self
            .store
            .get_property(stray.tag_id, DISPLAY_PROPERTY)?
            .is_none()
        {
            self.store
                .set_property(stray.tag_id, DISPLAY_PROPERTY, &person.display_label)?;
        }
        Ok(())
    }

    fn rename_with_display(&self, tag_id: TagId, label: &str) -> TagRepoResult<()> {
        self.store.rename_node(tag_id, label)?;
        self.store.set_property(tag_id, DISPLAY_PROPERTY, label)
    }
}
