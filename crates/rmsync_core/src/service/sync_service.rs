//! One synchronization run from genealogy source to tag store.
//!
//! # Responsibility
//! - Load the source snapshot and both branch indices outside any write.
//! - Run repair, dedupe, reconcile and sweep inside one guarded
//!   transaction.
//! - Produce a single `SyncReport` on success or a single `SyncError`.
//!
//! # Invariants
//! - Nothing is written before the transaction guard is open.
//! - On error the tag store is left as it was before the run.
//! - At most one node per `OwnerId` across both branches after success.

use crate::config::{OptionsError, SyncOptions};
use crate::db::DbError;
use crate::model::tag::{TagId, TagKind};
use crate::repo::genealogy_repo::{GenealogyRepoError, GenealogySource};
use crate::repo::tag_repo::{TagRepoError, TagRepoResult, TagStore};
use crate::service::destination_index::{load_branch_index, load_primary_index, BranchIndex};
use crate::service::duplicate_resolver::{collapse_catch_all, resolve_duplicates};
use crate::service::family_groups::FamilyGroups;
use crate::service::legacy_repair::repair_legacy_nodes;
use crate::service::orphan_sweeper::sweep_orphans;
use crate::service::reconciler::{PersonFailure, PersonStatus, Reconciler};
use crate::service::source_loader::{load_source, SourceData};
use crate::service::transaction::{run_guarded, TransactionError};
use log::{error, info};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub people_loaded: usize,
    pub families_loaded: usize,
    pub created: usize,
    pub updated: usize,
    pub rescued: usize,
    pub orphaned: usize,
    pub duplicates_removed: usize,
    pub legacy_bound: usize,
    pub legacy_renamed: usize,
    pub family_groups_created: usize,
    pub failed: Vec<PersonFailure>,
    /// Final state of every source person, in source order.
    pub people: Vec<PersonStatus>,
    /// Identity-bearing nodes in the primary branch at commit.
    pub primary_branch_size: usize,
    /// Identity-bearing nodes in the catch-all branch at commit.
    pub catch_all_branch_size: usize,
}

impl SyncReport {
    fn new(run_id: Uuid, source: &SourceData) -> Self {
        Self {
            run_id,
            people_loaded: source.people.len(),
            families_loaded: source.families.len(),
            created: 0,
            updated: 0,
            rescued: 0,
            orphaned: 0,
            duplicates_removed: 0,
            legacy_bound: 0,
            legacy_renamed: 0,
            family_groups_created: 0,
            failed: Vec::new(),
            people: Vec::new(),
            primary_branch_size: 0,
            catch_all_branch_size: 0,
        }
    }

    /// True when the run changed nothing in the tag store.
    pub fn is_noop(&self) -> bool {
        self.created == 0
            && self.updated == 0
            && self.rescued == 0
            && self.orphaned == 0
            && self.duplicates_removed == 0
            && self.legacy_bound == 0
            && self.legacy_renamed == 0
            && self.family_groups_created == 0
    }
}

/// Fatal run errors. Per-person problems are reported in `SyncReport`.
#[derive(Debug)]
pub enum SyncError {
    InvalidOptions(OptionsError),
    /// A database could not be opened or lacks the expected schema.
    Connection(DbError),
    /// Reading the genealogy source failed.
    SourceQuery(GenealogyRepoError),
    /// Reading the tag store outside the transaction failed.
    StoreQuery(TagRepoError),
    /// The mutation scope failed and was rolled back.
    Transaction(TransactionError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOptions(err) => write!(f, "invalid options: {err}"),
            Self::Connection(err) => write!(f, "connection failed: {err}"),
            Self::SourceQuery(err) => write!(f, "{err}"),
            Self::StoreQuery(err) => write!(f, "tag store query failed: {err}"),
            Self::Transaction(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidOptions(err) => Some(err),
            Self::Connection(err) => Some(err),
            Self::SourceQuery(err) => Some(err),
            Self::StoreQuery(err) => Some(err),
            Self::Transaction(err) => Some(err),
        }
    }
}

impl From<OptionsError> for SyncError {
    fn from(value: OptionsError) -> Self {
        Self::InvalidOptions(value)
    }
}

impl From<DbError> for SyncError {
    fn from(value: DbError) -> Self {
        Self::Connection(value)
    }
}

impl From<GenealogyRepoError> for SyncError {
    fn from(value: GenealogyRepoError) -> Self {
        Self::SourceQuery(value)
    }
}

impl From<TagRepoError> for SyncError {
    fn from(value: TagRepoError) -> Self {
        Self::StoreQuery(value)
    }
}

impl From<TransactionError> for SyncError {
    fn from(value: TransactionError) -> Self {
        Self::Transaction(value)
    }
}

/// Synchronization use-case over a genealogy source and a tag store.
pub struct SyncService<G: GenealogySource, S: TagStore> {
    source: G,
    store: S,
    options: SyncOptions,
}

impl<G: GenealogySource, S: TagStore> SyncService<G, S> {
    /// Creates the service after validating `options`.
    pub fn new(source: G, store: S, options: SyncOptions) -> Result<Self, SyncError> {
        let options = options.validate()?;
        Ok(Self {
            source,
            store,
            options,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Runs one full synchronization.
    pub fn run(&self) -> Result<SyncReport, SyncError> {
        let started_at = Instant::now();
        let run_id = Uuid::new_v4();
        info!(
            "event=sync_run module=service status=start run_id={} primary={:?} catch_all={:?} legacy_repair={}",
            run_id,
            self.options.primary_branch,
            self.options.catch_all_branch,
            self.options.legacy_repair
        );

        let result = self.run_once(run_id);
        match &result {
            Ok(report) => info!(
                "event=sync_run module=service status=ok run_id={} created={} updated={} rescued={} orphaned={} duplicates_removed={} failed={} duration_ms={}",
                run_id,
                report.created,
                report.updated,
                report.rescued,
                report.orphaned,
                report.duplicates_removed,
                report.failed.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=sync_run module=service status=error run_id={} error={} duration_ms={}",
                run_id,
                err,
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    fn run_once(&self, run_id: Uuid) -> Result<SyncReport, SyncError> {
        let primary_name = self.options.primary_branch.as_str();
        let catch_all_name = self.options.catch_all_branch.as_str();

        let source = load_source(&self.source)?;
        let primary = load_primary_index(&self.store, primary_name)?;
        let catch_all = load_branch_index(&self.store, catch_all_name)?;
        let mut report = SyncReport::new(run_id, &source);

        run_guarded(&self.store, &[primary_name, catch_all_name], || {
            self.apply(&source, primary, catch_all, &mut report)
        })?;
        Ok(report)
    }

    fn apply(
        &self,
        source: &SourceData,
        primary: BranchIndex,
        catch_all: BranchIndex,
        report: &mut SyncReport,
    ) -> TagRepoResult<()> {
        let store = &self.store;
        let primary_name = self.options.primary_branch.as_str();
        let catch_all_name = self.options.catch_all_branch.as_str();

        let primary_root = ensure_root(store, primary_name)?;
        let catch_all_root = ensure_root(store, catch_all_name)?;

        let repair = repair_legacy_nodes(
            store,
            primary_root,
            &source.people,
            &primary,
            self.options.legacy_repair,
        );
        report.legacy_bound = repair.bound;
        report.legacy_renamed = repair.renamed;
        let primary = if repair.changed() {
            load_primary_index(store, primary_name)?
        } else {
            primary
        };

        report.duplicates_removed = resolve_duplicates(store, &primary, &catch_all)?;
        let catch_all = if report.duplicates_removed > 0 {
            load_branch_index(store, catch_all_name)?
        } else {
            catch_all
        };

        let groups = FamilyGroups::new(&source.families, primary_root);
        let mut reconciler = Reconciler::new(store, primary_root, groups);
        let outcome = reconciler.reconcile(&source.people, &primary, &catch_all)?;
        report.created = outcome.created;
        report.updated = outcome.updated;
        report.rescued = outcome.rescued;
        report.family_groups_created = reconciler.groups_created();
        report.people = outcome.statuses(&source.people);

        if outcome.rescued > 0 || !catch_all.shadowed().is_empty() {
            let primary_now = load_primary_index(store, primary_name)?;
            let catch_all_now = load_branch_index(store, catch_all_name)?;
            report.duplicates_removed += resolve_duplicates(store, &primary_now, &catch_all_now)?;
            report.duplicates_removed += collapse_catch_all(store, &primary_now, &catch_all_now)?;
        }

        let sweep = sweep_orphans(store, &primary, &outcome.claimed, catch_all_root)?;
        report.orphaned = sweep.moved;
        report.failed = outcome.failed;
        report.failed.extend(sweep.failed);

        report.primary_branch_size = load_primary_index(store, primary_name)?.len();
        report.catch_all_branch_size = load_branch_index(store, catch_all_name)?.len();
        Ok(())
    }
}

fn ensure_root<S: TagStore + ?Sized>(store: &S, name: &str) -> TagRepoResult<TagId> {
    if let Some(existing) = store.find_node_by_name(name)? {
        return Ok(existing);
    }
    let created = store.create_node(name, TagId::ROOT, TagKind::Container)?;
    info!(
        "event=branch_root_created module=service status=ok name={:?} tag_id={}",
        name, created
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::{SyncError, SyncService};
    use crate::config::SyncOptions;
    use crate::model::genealogy::{FamilyRow, PersonRow};
    use crate::repo::genealogy_repo::{GenealogyResult, GenealogySource};
    use crate::repo::memory_tag_repo::MemoryTagStore;
    use crate::repo::tag_repo::TagStore;

    struct FixedSource(Vec<PersonRow>);

    impl GenealogySource for FixedSource {
        fn list_primary_people(&self) -> GenealogyResult<Vec<PersonRow>> {
            Ok(self.0.clone())
        }

        fn list_families(&self) -> GenealogyResult<Vec<FamilyRow>> {
            Ok(Vec::new())
        }
    }

    fn jane() -> PersonRow {
        PersonRow {
            owner_id: 7,
            given_name: "Jane".to_string(),
            surname: "Doe".to_string(),
            birth_year: 1900,
            death_year: 0,
            family_id: 0,
        }
    }

    #[test]
    fn new_rejects_invalid_options() {
        let options = SyncOptions {
            primary_branch: " ".to_string(),
            ..SyncOptions::default()
        };
        let result = SyncService::new(FixedSource(Vec::new()), MemoryTagStore::new(), options);
        assert!(matches!(result, Err(SyncError::InvalidOptions(_))));
    }

    #[test]
    fn first_run_creates_roots_and_person_then_goes_quiet() {
        let service = SyncService::new(
            FixedSource(vec![jane()]),
            MemoryTagStore::new(),
            SyncOptions::default(),
        )
        .unwrap();

        let first = service.run().unwrap();
        assert_eq!(first.created, 1);
        assert_eq!(first.primary_branch_size, 1);
        assert_eq!(first.catch_all_branch_size, 0);
        assert!(service.store().find_node_by_name("Lost & Found").unwrap().is_some());

        let second = service.run().unwrap();
        assert!(second.is_noop());
        assert_ne!(first.run_id, second.run_id);
    }

    #[test]
    fn report_serializes_for_json_output() {
        let service = SyncService::new(
            FixedSource(vec![jane()]),
            MemoryTagStore::new(),
            SyncOptions::default(),
        )
        .unwrap();
        let report = service.run().unwrap();

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["created"], 1);
        assert_eq!(value["people"][0]["owner_id"], 7);
        assert_eq!(value["people"][0]["state"], "created");
        assert_eq!(value["run_id"], report.run_id.to_string());
        assert!(value["failed"].as_array().unwrap().is_empty());
    }
}
