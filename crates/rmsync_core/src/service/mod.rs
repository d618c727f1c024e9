//! Reconciliation use-case services.
//!
//! # Responsibility
//! - Turn repository primitives into one synchronization run.
//! - Keep the CLI decoupled from storage details.

pub mod destination_index;
pub mod duplicate_resolver;
pub mod family_groups;
pub mod legacy_repair;
pub mod orphan_sweeper;
pub mod reconciler;
pub mod source_loader;
pub mod sync_service;
pub mod transaction;
