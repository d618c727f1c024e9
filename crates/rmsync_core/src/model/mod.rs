//! Domain model shared by loaders, stores and reconciliation.
//!
//! # Responsibility
//! - Define genealogy records, tag nodes and the identity types joining them.
//! - Own the canonical label format.
//!
//! # Invariants
//! - `OwnerId`, `FamilyId` and `TagId` are distinct types and never mixed.

pub mod genealogy;
pub mod label;
pub mod tag;
