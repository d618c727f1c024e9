//! Repository layer over the two external stores.
//!
//! # Responsibility
//! - Define the read contract for genealogy data and the mutation contract
//!   for the tag tree.
//! - Isolate RootsMagic and digiKam SQL from reconciliation logic.
//!
//! # Invariants
//! - Tag store name collisions are reported as semantic errors
//!   (`NameConflict`) so callers can recover per person.

pub mod genealogy_repo;
pub mod memory_tag_repo;
pub mod tag_repo;
