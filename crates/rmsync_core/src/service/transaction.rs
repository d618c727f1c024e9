//! Atomic mutation scope over a tag store.
//!
//! # Responsibility
//! - Checkpoint the branches a run may touch, open a transaction, and
//!   either commit or return the store to the checkpoint.
//!
//! # Invariants
//! - The checkpoint is taken before the transaction opens.
//! - On failure the store is rolled back; when rollback alone is not
//!   enough (non-native rollback, or rollback failed) the checkpoint is
//!   restored.
//! - A guard dropped without commit aborts.

use crate::repo::tag_repo::{TagCheckpoint, TagRepoError, TagStore};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors surfaced by a guarded mutation scope.
#[derive(Debug)]
pub enum TransactionError {
    /// Capturing the checkpoint failed; nothing was changed.
    Checkpoint(TagRepoError),
    /// Opening the transaction failed; nothing was changed.
    Begin(TagRepoError),
    /// Work or commit failed and the store is back at the checkpoint.
    Aborted {
        cause: TagRepoError,
        restored_from_checkpoint: bool,
    },
    /// Work failed and the checkpoint could not be restored either.
    RestoreFailed {
        cause: TagRepoError,
        restore: TagRepoError,
    },
}

impl TransactionError {
    /// The error that triggered the abort, if any.
    pub fn cause(&self) -> &TagRepoError {
        match self {
            Self::Checkpoint(err) | Self::Begin(err) => err,
            Self::Aborted { cause, .. } | Self::RestoreFailed { cause, .. } => cause,
        }
    }
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkpoint(err) => write!(f, "failed to checkpoint tag tree: {err}"),
            Self::Begin(err) => write!(f, "failed to open transaction: {err}"),
            Self::Aborted {
                cause,
                restored_from_checkpoint,
            } => {
                if *restored_from_checkpoint {
                    write!(f, "sync aborted and restored from checkpoint: {cause}")
                } else {
                    write!(f, "sync aborted and rolled back: {cause}")
                }
            }
            Self::RestoreFailed { cause, restore } => write!(
                f,
                "sync aborted ({cause}) and checkpoint restore failed: {restore}"
            ),
        }
    }
}

impl Error for TransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause())
    }
}

/// Open mutation scope; commit or abort exactly once.
pub struct TransactionGuard<'s, S: TagStore + ?Sized> {
    store: &'s S,
    checkpoint: TagCheckpoint,
    finished: bool,
}

impl<'s, S: TagStore + ?Sized> TransactionGuard<'s, S> {
    /// Checkpoints the subtrees under `scope` and opens a transaction.
    pub fn begin(store: &'s S, scope: &[&str]) -> Result<Self, TransactionError> {
        let checkpoint = store.checkpoint(scope).map_err(TransactionError::Checkpoint)?;
        store.begin_transaction().map_err(TransactionError::Begin)?;
        info!(
            "event=transaction_begin module=service status=ok scope={:?} checkpoint_tags={}",
            scope,
            checkpoint.tags.len()
        );
        Ok(Self {
            store,
            checkpoint,
            finished: false,
        })
    }

    /// Commits; a failed commit aborts like failed work.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        self.finished = true;
        match self.store.commit() {
            Ok(()) => {
                info!("event=transaction_commit module=service status=ok");
                Ok(())
            }
            Err(cause) => Err(self.abort_with(cause)),
        }
    }

    /// Rolls back, restoring the checkpoint when needed.
    pub fn abort(mut self, cause: TagRepoError) -> TransactionError {
        self.finished = true;
        self.abort_with(cause)
    }

    fn abort_with(&self, cause: TagRepoError) -> TransactionError {
        warn!(
            "event=transaction_abort module=service status=error cause={}",
            cause
        );
        let rolled_back = match self.store.rollback() {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=transaction_rollback module=service status=error error={}",
                    err
                );
                false
            }
        };
        if rolled_back && self.store.native_rollback() {
            return TransactionError::Aborted {
                cause,
                restored_from_checkpoint: false,
            };
        }

        match self.store.restore(&self.checkpoint) {
            Ok(()) => {
                info!("event=checkpoint_restore module=service status=ok");
                TransactionError::Aborted {
                    cause,
                    restored_from_checkpoint: true,
                }
            }
            Err(restore) => {
                error!(
                    "event=checkpoint_restore module=service status=error error={}",
                    restore
                );
                TransactionError::RestoreFailed { cause, restore }
            }
        }
    }
}

impl<S: TagStore + ?Sized> Drop for TransactionGuard<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            let _ = self.abort_with(TagRepoError::TransactionState(
                "guard dropped without commit",
            ));
        }
    }
}

/// Runs `work` inside a guarded transaction over `scope`.
pub fn run_guarded<S, T, F>(store: &S, scope: &[&str], work: F) -> Result<T, TransactionError>
where
    S: TagStore + ?Sized,
    F: FnOnce() -> Result<T, TagRepoError>,
{
    let guard = TransactionGuard::begin(store, scope)?;
    match work() {
        Ok(value) => {
            guard.commit()?;
            Ok(value)
        }
        Err(cause) => Err(guard.abort(cause)),
    }
}

#[cfg(test)]
mod tests {
    use super::{run_guarded, TransactionError, TransactionGuard};
    use crate::model::tag::{TagId, TagKind, IDENTITY_PROPERTY};
    use crate::repo::memory_tag_repo::MemoryTagStore;
    use crate::repo::tag_repo::{SqliteTagStore, TagRepoError, TagStore};
    use rusqlite::Connection;

    fn seeded_memory() -> MemoryTagStore {
        let store = MemoryTagStore::new();
        let root = store
            .create_node("RootsMagic", TagId::ROOT, TagKind::Container)
            .unwrap();
        let jane = store.create_node("Jane", root, TagKind::Person).unwrap();
        store.set_property(jane, IDENTITY_PROPERTY, "7").unwrap();
        store
    }

    #[test]
    fn commit_keeps_changes() {
        let store = seeded_memory();
        let created = run_guarded(&store, &["RootsMagic", "Lost & Found"], || {
            store.create_node("Lost & Found", TagId::ROOT, TagKind::Container)
        })
        .unwrap();

        assert!(store.get_node(created).unwrap().is_some());
    }

    #[test]
    fn failure_restores_checkpoint_when_rollback_is_not_native() {
        let store = seeded_memory();
        let before = store.dump();

        let err = run_guarded(&store, &["RootsMagic", "Lost & Found"], || {
            let root = store.find_node_by_name("RootsMagic")?.unwrap_or(TagId::ROOT);
            store.create_node("John", root, TagKind::Person)?;
            store.create_node("Lost & Found", TagId::ROOT, TagKind::Container)?;
            store.delete_node(TagId(2))?;
            Err::<(), _>(TagRepoError::InvalidData("forced".to_string()))
        })
        .unwrap_err();

        assert!(matches!(
            err,
            TransactionError::Aborted {
                restored_from_checkpoint: true,
                ..
            }
        ));
        assert_eq!(store.dump(), before);
    }

    #[test]
    fn failure_uses_native_rollback_for_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Tags (id INTEGER PRIMARY KEY, pid INTEGER, name TEXT NOT NULL,
                                icon INTEGER, iconkde TEXT, UNIQUE (name, pid));
             CREATE TABLE TagProperties (tagid INTEGER, property TEXT, value TEXT);",
        )
        .unwrap();
        let store = SqliteTagStore::try_new(&conn).unwrap();

        let err = run_guarded(&store, &["RootsMagic"], || {
            store.create_node("RootsMagic", TagId::ROOT, TagKind::Container)?;
            Err::<(), _>(TagRepoError::InvalidData("forced".to_string()))
        })
        .unwrap_err();

        assert!(matches!(
            err,
            TransactionError::Aborted {
                restored_from_checkpoint: false,
                ..
            }
        ));
        assert!(store.find_node_by_name("RootsMagic").unwrap().is_none());
        assert!(conn.is_autocommit());
    }

    #[test]
    fn dropped_guard_aborts() {
        let store = seeded_memory();
        let before = store.dump();
        {
            let _guard = TransactionGuard::begin(&store, &["RootsMagic"]).unwrap();
            store
                .create_node("John", TagId(1), TagKind::Person)
                .unwrap();
        }

        assert_eq!(store.dump(), before);
        assert!(store.begin_transaction().is_ok());
    }
}
