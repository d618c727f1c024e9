//! Core logic for mirroring a RootsMagic family tree into digiKam tags.
//! This crate owns every reconciliation invariant; the CLI only wires it up.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{LegacyRepair, OptionsError, SyncOptions};
pub use db::{open_genealogy_db, open_tag_db, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::genealogy::{FamilyId, FamilyRecord, OwnerId, PersonRecord};
pub use model::tag::{TagId, TagNode};
pub use repo::genealogy_repo::{GenealogyRepoError, GenealogySource, SqliteGenealogySource};
pub use repo::memory_tag_repo::MemoryTagStore;
pub use repo::tag_repo::{SqliteTagStore, TagRepoError, TagRepoResult, TagStore};
pub use service::reconciler::{PersonFailure, PersonState, PersonStatus};
pub use service::sync_service::{SyncError, SyncReport, SyncService};
pub use service::transaction::TransactionError;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
