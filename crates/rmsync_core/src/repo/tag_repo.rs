//! Tag store contracts and the digiKam SQLite implementation.
//!
//! # Responsibility
//! - Expose the tag tree primitives reconciliation needs (lookup, create,
//!   rename, re-parent, delete, properties, transactions, checkpoints).
//! - Keep digiKam SQL (`Tags`, `TagProperties`) inside the repository
//!   boundary.
//!
//! # Invariants
//! - `(name, parent)` is unique among tags; violations surface as
//!   `TagRepoError::NameConflict`, never as raw SQLite errors.
//! - `set_property` leaves exactly one row per `(tag, key)`.
//! - `delete_node` removes the node's properties with it.
//! - Child listings are ordered by `tag_id` ascending.

use crate::db::schema::{ensure_tables, TAG_STORE_TABLES};
use crate::db::DbError;
use crate::model::genealogy::OwnerId;
use crate::model::tag::{TagId, TagKind, TagNode, IDENTITY_PROPERTY};
use log::debug;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by tag store operations.
pub type TagRepoResult<T> = Result<T, TagRepoError>;

/// Errors from tag store operations.
#[derive(Debug)]
pub enum TagRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target tag does not exist.
    NodeNotFound(TagId),
    /// Another tag with the same name already sits under `parent`.
    NameConflict { parent: TagId, name: String },
    /// Transaction primitive called in the wrong state.
    TransactionState(&'static str),
    /// Persisted data cannot be converted to the read model.
    InvalidData(String),
}

impl TagRepoError {
    /// Name conflicts are recoverable per person; everything else is not.
    pub fn is_name_conflict(&self) -> bool {
        matches!(self, Self::NameConflict { .. })
    }
}

impl Display for TagRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NodeNotFound(id) => write!(f, "tag not found: {id}"),
            Self::NameConflict { parent, name } => {
                write!(f, "tag `{name}` already exists under parent {parent}")
            }
            Self::TransactionState(message) => write!(f, "invalid transaction state: {message}"),
            Self::InvalidData(message) => write!(f, "invalid tag data: {message}"),
        }
    }
}

impl Error for TagRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for TagRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TagRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Raw `Tags` row captured by a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub id: TagId,
    pub pid: TagId,
    pub name: String,
    pub icon: Option<i64>,
    pub iconkde: Option<String>,
}

/// Raw `TagProperties` row captured by a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRow {
    pub tag_id: TagId,
    pub property: String,
    pub value: Option<String>,
}

/// Copy of the subtrees under a set of root-level containers.
///
/// Restoring it replaces whatever those subtrees contain at restore time,
/// keeping original tag ids so external associations stay valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCheckpoint {
    pub roots: Vec<String>,
    pub tags: Vec<TagRow>,
    pub properties: Vec<PropertyRow>,
}

/// Storage interface consumed by reconciliation.
pub trait TagStore {
    /// Finds a root-level container by exact name.
    fn find_node_by_name(&self, name: &str) -> TagRepoResult<Option<TagId>>;
    /// Finds a direct child of `parent` by exact name.
    fn find_child_by_name(&self, parent: TagId, name: &str) -> TagRepoResult<Option<TagId>>;
    /// Loads one tag with its identity property.
    fn get_node(&self, id: TagId) -> TagRepoResult<Option<TagNode>>;
    /// Creates one tag and returns its store-assigned id.
    fn create_node(&self, name: &str, parent: TagId, kind: TagKind) -> TagRepoResult<TagId>;
    /// Renames one tag in place.
    fn rename_node(&self, id: TagId, name: &str) -> TagRepoResult<()>;
    /// Moves one tag under another parent.
    fn reparent_node(&self, id: TagId, parent: TagId) -> TagRepoResult<()>;
    /// Permanently deletes one tag and its properties.
    fn delete_node(&self, id: TagId) -> TagRepoResult<()>;
    /// Returns the first value stored for `key`.
    fn get_property(&self, id: TagId, key: &str) -> TagRepoResult<Option<String>>;
    /// Replaces every value of `key` with `value`.
    fn set_property(&self, id: TagId, key: &str, value: &str) -> TagRepoResult<()>;
    /// Lists direct children of `parent`.
    fn list_children(&self, parent: TagId) -> TagRepoResult<Vec<TagNode>>;
    /// Lists direct children of `parent` carrying `key`.
    fn list_children_with_property(&self, parent: TagId, key: &str) -> TagRepoResult<Vec<TagId>>;
    /// Lists direct children of `parent` lacking `key`.
    fn list_children_without_property(
        &self,
        parent: TagId,
        key: &str,
    ) -> TagRepoResult<Vec<TagId>>;
    fn begin_transaction(&self) -> TagRepoResult<()>;
    fn commit(&self) -> TagRepoResult<()>;
    fn rollback(&self) -> TagRepoResult<()>;
    /// True when `rollback` alone undoes every structural change.
    fn native_rollback(&self) -> bool;
    /// Captures the subtrees under the named root-level containers.
    fn checkpoint(&self, roots: &[&str]) -> TagRepoResult<TagCheckpoint>;
    /// Replaces the checkpointed subtrees with the captured rows.
    fn restore(&self, checkpoint: &TagCheckpoint) -> TagRepoResult<()>;
}

/// digiKam-backed tag store.
pub struct SqliteTagStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagStore<'conn> {
    /// Creates the store from a connection carrying the digiKam tag tables.
    pub fn try_new(conn: &'conn Connection) -> TagRepoResult<Self> {
        ensure_tables(conn, TAG_STORE_TABLES)?;
        Ok(Self { conn })
    }
}

impl TagStore for SqliteTagStore<'_> {
    fn find_node_by_name(&self, name: &str) -> TagRepoResult<Option<TagId>> {
        self.find_child_by_name(TagId::ROOT, name)
    }

    fn find_child_by_name(&self, parent: TagId, name: &str) -> TagRepoResult<Option<TagId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id
                 FROM Tags
                 WHERE pid = ?1
                   AND name = ?2
                 ORDER BY id ASC
                 LIMIT 1;",
                params![parent.0, name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(TagId))
    }

    fn get_node(&self, id: TagId) -> TagRepoResult<Option<TagNode>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                t.id AS id,
                t.name AS name,
                t.pid AS pid,
                (SELECT tp.value
                 FROM TagProperties tp
                 WHERE tp.tagid = t.id
                   AND tp.property = ?2
                 ORDER BY tp.rowid ASC
                 LIMIT 1) AS owner_id
             FROM Tags t
             WHERE t.id = ?1;",
        )?;
        let mut rows = stmt.query(params![id.0, IDENTITY_PROPERTY])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_tag_node_row(row)?));
        }
        Ok(None)
    }

    fn create_node(&self, name: &str, parent: TagId, kind: TagKind) -> TagRepoResult<TagId> {
        self.conn
            .execute(
                "INSERT INTO Tags (name, pid, icon, iconkde)
                 VALUES (?1, ?2, NULL, ?3);",
                params![name, parent.0, kind.icon_name()],
            )
            .map_err(|err| name_conflict_or(err, parent, name))?;
        Ok(TagId(self.conn.last_insert_rowid()))
    }

    fn rename_node(&self, id: TagId, name: &str) -> TagRepoResult<()> {
        let parent = self.require_parent(id)?;
        let changed = self
            .conn
            .execute(
                "UPDATE Tags SET name = ?2 WHERE id = ?1;",
                params![id.0, name],
            )
            .map_err(|err| name_conflict_or(err, parent, name))?;
        if changed == 0 {
            return Err(TagRepoError::NodeNotFound(id));
        }
        Ok(())
    }

    fn reparent_node(&self, id: TagId, parent: TagId) -> TagRepoResult<()> {
        let name: Option<String> = self
            .conn
            .query_row("SELECT name FROM Tags WHERE id = ?1;", [id.0], |row| {
                row.get(0)
            })
            .optional()?;
        let name = name.ok_or(TagRepoError::NodeNotFound(id))?;
        self.conn
            .execute(
                "UPDATE Tags SET pid = ?2 WHERE id = ?1;",
                params![id.0, parent.0],
            )
            .map_err(|err| name_conflict_or(err, parent, &name))?;
        Ok(())
    }

    fn delete_node(&self, id: TagId) -> TagRepoResult<()> {
        self.conn
            .execute("DELETE FROM TagProperties WHERE tagid = ?1;", [id.0])?;
        let changed = self.conn.execute("DELETE FROM Tags WHERE id = ?1;", [id.0])?;
        if changed == 0 {
            return Err(TagRepoError::NodeNotFound(id));
        }
        Ok(())
    }

    fn get_property(&self, id: TagId, key: &str) -> TagRepoResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value
                 FROM TagProperties
                 WHERE tagid = ?1
                   AND property = ?2
                 ORDER BY rowid ASC
                 LIMIT 1;",
                params![id.0, key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    fn set_property(&self, id: TagId, key: &str, value: &str) -> TagRepoResult<()> {
        self.require_parent(id)?;
        self.conn.execute(
            "DELETE FROM TagProperties WHERE tagid = ?1 AND property = ?2;",
            params![id.0, key],
        )?;
        self.conn.execute(
            "INSERT INTO TagProperties (tagid, property, value) VALUES (?1, ?2, ?3);",
            params![id.0, key, value],
        )?;
        Ok(())
    }

    fn list_children(&self, parent: TagId) -> TagRepoResult<Vec<TagNode>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                t.id AS id,
                t.name AS name,
                t.pid AS pid,
                (SELECT tp.value
                 FROM TagProperties tp
                 WHERE tp.tagid = t.id
                   AND tp.property = ?2
                 ORDER BY tp.rowid ASC
                 LIMIT 1) AS owner_id
             FROM Tags t
             WHERE t.pid = ?1
             ORDER BY t.id ASC;",
        )?;
        let mut rows = stmt.query(params![parent.0, IDENTITY_PROPERTY])?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_tag_node_row(row)?);
        }
        Ok(nodes)
    }

    fn list_children_with_property(&self, parent: TagId, key: &str) -> TagRepoResult<Vec<TagId>> {
        self.child_ids(
            "SELECT t.id
             FROM Tags t
             WHERE t.pid = ?1
               AND EXISTS (
                 SELECT 1 FROM TagProperties tp
                 WHERE tp.tagid = t.id AND tp.property = ?2
               )
             ORDER BY t.id ASC;",
            parent,
            key,
        )
    }

    fn list_children_without_property(
        &self,
        parent: TagId,
        key: &str,
    ) -> TagRepoResult<Vec<TagId>> {
        self.child_ids(
            "SELECT t.id
             FROM Tags t
             WHERE t.pid = ?1
               AND NOT EXISTS (
                 SELECT 1 FROM TagProperties tp
                 WHERE tp.tagid = t.id AND tp.property = ?2
               )
             ORDER BY t.id ASC;",
            parent,
            key,
        )
    }

    fn begin_transaction(&self) -> TagRepoResult<()> {
        if !self.conn.is_autocommit() {
            return Err(TagRepoError::TransactionState("transaction already open"));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(())
    }

    fn commit(&self) -> TagRepoResult<()> {
        if self.conn.is_autocommit() {
            return Err(TagRepoError::TransactionState("commit without open transaction"));
        }
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    fn rollback(&self) -> TagRepoResult<()> {
        if self.conn.is_autocommit() {
            return Err(TagRepoError::TransactionState(
                "rollback without open transaction",
            ));
        }
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    fn native_rollback(&self) -> bool {
        true
    }

    fn checkpoint(&self, roots: &[&str]) -> TagRepoResult<TagCheckpoint> {
        let mut checkpoint = TagCheckpoint {
            roots: roots.iter().map(|root| root.to_string()).collect(),
            ..TagCheckpoint::default()
        };

        for root in roots {
            let mut stmt = self.conn.prepare(&format!(
                "{SUBTREE_CTE}
                 SELECT id, pid, name, icon, iconkde
                 FROM Tags
                 WHERE id IN (SELECT id FROM subtree)
                 ORDER BY id ASC;"
            ))?;
            let mut rows = stmt.query([root])?;
            while let Some(row) = rows.next()? {
                checkpoint.tags.push(TagRow {
                    id: TagId(row.get(0)?),
                    pid: TagId(row.get(1)?),
                    name: row.get(2)?,
                    icon: row.get(3)?,
                    iconkde: row.get(4)?,
                });
            }

            let mut stmt = self.conn.prepare(&format!(
                "{SUBTREE_CTE}
                 SELECT tagid, property, value
                 FROM TagProperties
                 WHERE tagid IN (SELECT id FROM subtree)
                 ORDER BY rowid ASC;"
            ))?;
            let mut rows = stmt.query([root])?;
            while let Some(row) = rows.next()? {
                checkpoint.properties.push(PropertyRow {
                    tag_id: TagId(row.get(0)?),
                    property: row.get(1)?,
                    value: row.get(2)?,
                });
            }
        }

        debug!(
            "event=tag_checkpoint module=repo status=ok roots={} tags={} properties={}",
            checkpoint.roots.len(),
            checkpoint.tags.len(),
            checkpoint.properties.len()
        );
        Ok(checkpoint)
    }

    fn restore(&self, checkpoint: &TagCheckpoint) -> TagRepoResult<()> {
        self.conn.execute_batch("SAVEPOINT rmsync_restore;")?;
        match restore_rows(self.conn, checkpoint) {
            Ok(()) => {
                self.conn.execute_batch("RELEASE rmsync_restore;")?;
                Ok(())
            }
            Err(err) => {
                let _ = self
                    .conn
                    .execute_batch("ROLLBACK TO rmsync_restore; RELEASE rmsync_restore;");
                Err(err)
            }
        }
    }
}

impl SqliteTagStore<'_> {
    fn require_parent(&self, id: TagId) -> TagRepoResult<TagId> {
        let pid: Option<i64> = self
            .conn
            .query_row("SELECT pid FROM Tags WHERE id = ?1;", [id.0], |row| {
                row.get(0)
            })
            .optional()?;
        pid.map(TagId).ok_or(TagRepoError::NodeNotFound(id))
    }

    fn child_ids(&self, sql: &str, parent: TagId, key: &str) -> TagRepoResult<Vec<TagId>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params![parent.0, key])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(TagId(row.get(0)?));
        }
        Ok(ids)
    }
}

/// Selects every tag id in the subtree of the root-level tag named `?1`.
const SUBTREE_CTE: &str = "WITH RECURSIVE subtree(id) AS (
    SELECT id FROM Tags WHERE pid = 0 AND name = ?1
    UNION
    SELECT child.id
    FROM Tags child
    INNER JOIN subtree parent ON child.pid = parent.id
)";

fn restore_rows(conn: &Connection, checkpoint: &TagCheckpoint) -> TagRepoResult<()> {
    for root in &checkpoint.roots {
        conn.execute(
            &format!(
                "{SUBTREE_CTE}
                 DELETE FROM TagProperties WHERE tagid IN (SELECT id FROM subtree);"
            ),
            [root],
        )?;
        conn.execute(
            &format!(
                "{SUBTREE_CTE}
                 DELETE FROM Tags WHERE id IN (SELECT id FROM subtree);"
            ),
            [root],
        )?;
    }

    for tag in &checkpoint.tags {
        conn.execute(
            "INSERT INTO Tags (id, pid, name, icon, iconkde) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![tag.id.0, tag.pid.0, tag.name, tag.icon, tag.iconkde],
        )?;
    }
    for property in &checkpoint.properties {
        conn.execute(
            "INSERT INTO TagProperties (tagid, property, value) VALUES (?1, ?2, ?3);",
            params![property.tag_id.0, property.property, property.value],
        )?;
    }
    Ok(())
}

fn parse_tag_node_row(row: &Row<'_>) -> TagRepoResult<TagNode> {
    let tag_id = TagId(row.get("id")?);
    let owner_text: Option<String> = row.get("owner_id")?;
    let owner_id = match owner_text {
        None => None,
        Some(text) => {
            let parsed = OwnerId::parse_property(&text);
            if parsed.is_none() {
                debug!(
                    "event=identity_parse module=repo status=skipped tag_id={} value={:?}",
                    tag_id, text
                );
            }
            parsed
        }
    };
    Ok(TagNode {
        tag_id,
        display_name: row.get("name")?,
        parent_id: TagId(row.get::<_, Option<i64>>("pid")?.unwrap_or(0)),
        owner_id,
    })
}

fn name_conflict_or(err: rusqlite::Error, parent: TagId, name: &str) -> TagRepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            TagRepoError::NameConflict {
                parent,
                name: name.to_string(),
            }
        }
        _ => err.into(),
    }
}
