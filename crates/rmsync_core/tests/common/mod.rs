#![allow(dead_code)]

use rmsync_core::model::tag::{TagId, TagKind, TagNode};
use rmsync_core::repo::tag_repo::{TagCheckpoint, TagRepoError, TagRepoResult, TagStore};
use rmsync_core::{
    open_genealogy_db, open_tag_db, SqliteGenealogySource, SqliteTagStore, SyncError,
    SyncOptions, SyncReport, SyncService,
};
use rusqlite::{params, Connection};
use std::cell::Cell;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// RootsMagic and digiKam files in one temp directory.
pub struct Fixture {
    _dir: TempDir,
    pub rootsmagic: PathBuf,
    pub digikam: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let rootsmagic = dir.path().join("tree.rmtree");
        let digikam = dir.path().join("digikam4.db");

        let conn = rootsmagic_conn(&rootsmagic);
        conn.execute_batch(
            "CREATE TABLE NameTable (
                NameID INTEGER PRIMARY KEY,
                OwnerID INTEGER,
                Surname TEXT COLLATE RMNOCASE,
                Given TEXT COLLATE RMNOCASE,
                IsPrimary INTEGER,
                BirthYear INTEGER,
                DeathYear INTEGER
             );
             CREATE TABLE FamilyTable (
                FamilyID INTEGER PRIMARY KEY,
                FatherID INTEGER,
                MotherID INTEGER
             );
             CREATE TABLE ChildTable (
                RecID INTEGER PRIMARY KEY,
                ChildID INTEGER,
                FamilyID INTEGER
             );",
        )
        .unwrap();

        let conn = Connection::open(&digikam).unwrap();
        conn.execute_batch(
            "CREATE TABLE Tags (
                id INTEGER PRIMARY KEY,
                pid INTEGER,
                name TEXT NOT NULL,
                icon INTEGER,
                iconkde TEXT,
                UNIQUE (name, pid)
             );
             CREATE TABLE TagProperties (
                tagid INTEGER,
                property TEXT,
                value TEXT
             );
             INSERT INTO Tags (id, pid, name) VALUES (1, 0, 'Holidays');",
        )
        .unwrap();

        Self {
            _dir: dir,
            rootsmagic,
            digikam,
        }
    }

    pub fn dir(&self) -> &Path {
        self._dir.path()
    }

    pub fn genealogy(&self) -> Connection {
        rootsmagic_conn(&self.rootsmagic)
    }

    pub fn tags(&self) -> Connection {
        Connection::open(&self.digikam).unwrap()
    }

    pub fn add_person(&self, owner_id: i64, given: &str, surname: &str, birth: i64, death: i64) {
        self.genealogy()
            .execute(
                "INSERT INTO NameTable (OwnerID, Surname, Given, IsPrimary, BirthYear, DeathYear)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5);",
                params![owner_id, surname, given, birth, death],
            )
            .unwrap();
    }

    pub fn add_alternate_name(&self, owner_id: i64, given: &str, surname: &str) {
        self.genealogy()
            .execute(
                "INSERT INTO NameTable (OwnerID, Surname, Given, IsPrimary, BirthYear, DeathYear)
                 VALUES (?1, ?2, ?3, 0, 0, 0);",
                params![owner_id, surname, given],
            )
            .unwrap();
    }

    pub fn set_death_year(&self, owner_id: i64, death: i64) {
        self.genealogy()
            .execute(
                "UPDATE NameTable SET DeathYear = ?2 WHERE OwnerID = ?1;",
                params![owner_id, death],
            )
            .unwrap();
    }

    pub fn remove_person(&self, owner_id: i64) {
        self.genealogy()
            .execute("DELETE FROM NameTable WHERE OwnerID = ?1;", [owner_id])
            .unwrap();
    }

    pub fn add_family(&self, family_id: i64, father: i64, mother: i64) {
        self.genealogy()
            .execute(
                "INSERT INTO FamilyTable (FamilyID, FatherID, MotherID) VALUES (?1, ?2, ?3);",
                params![family_id, father, mother],
            )
            .unwrap();
    }

    pub fn add_child(&self, child: i64, family_id: i64) {
        self.genealogy()
            .execute(
                "INSERT INTO ChildTable (ChildID, FamilyID) VALUES (?1, ?2);",
                params![child, family_id],
            )
            .unwrap();
    }

    pub fn insert_tag(&self, id: i64, pid: i64, name: &str) {
        self.tags()
            .execute(
                "INSERT INTO Tags (id, pid, name, icon, iconkde) VALUES (?1, ?2, ?3, NULL, NULL);",
                params![id, pid, name],
            )
            .unwrap();
    }

    pub fn insert_property(&self, tag_id: i64, key: &str, value: &str) {
        self.tags()
            .execute(
                "INSERT INTO TagProperties (tagid, property, value) VALUES (?1, ?2, ?3);",
                params![tag_id, key, value],
            )
            .unwrap();
    }

    /// Runs one sync against fresh connections to both files.
    pub fn sync(&self) -> Result<SyncReport, SyncError> {
        self.sync_with(SyncOptions::default())
    }

    pub fn sync_with(&self, options: SyncOptions) -> Result<SyncReport, SyncError> {
        let genealogy = open_genealogy_db(&self.rootsmagic)?;
        let tags = open_tag_db(&self.digikam)?;
        let source = SqliteGenealogySource::try_new(&genealogy)?;
        let store = SqliteTagStore::try_new(&tags)?;
        let service = SyncService::new(source, store, options)?;
        let report = service.run();
        report
    }

    /// Every tag row ordered by id.
    pub fn tag_rows(&self) -> Vec<(i64, i64, String)> {
        let conn = self.tags();
        let mut stmt = conn
            .prepare("SELECT id, pid, name FROM Tags ORDER BY id;")
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows
    }

    /// Every property row ordered by tag, property and value.
    pub fn property_rows(&self) -> Vec<(i64, String, Option<String>)> {
        let conn = self.tags();
        let mut stmt = conn
            .prepare("SELECT tagid, property, value FROM TagProperties ORDER BY tagid, property, value;")
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows
    }

    pub fn tag_id(&self, parent: i64, name: &str) -> Option<i64> {
        self.tags()
            .query_row(
                "SELECT id FROM Tags WHERE pid = ?1 AND name = ?2;",
                params![parent, name],
                |row| row.get(0),
            )
            .ok()
    }

    pub fn root_id(&self, name: &str) -> i64 {
        self.tag_id(0, name).unwrap()
    }

    pub fn children(&self, parent: i64) -> Vec<(i64, String)> {
        self.tag_rows()
            .into_iter()
            .filter(|(_, pid, _)| *pid == parent)
            .map(|(id, _, name)| (id, name))
            .collect()
    }

    pub fn property(&self, tag_id: i64, key: &str) -> Option<String> {
        self.tags()
            .query_row(
                "SELECT value FROM TagProperties WHERE tagid = ?1 AND property = ?2;",
                params![tag_id, key],
                |row| row.get(0),
            )
            .ok()
    }

    /// Tags carrying `rootsmagic_owner_id = owner_id`, anywhere in the tree.
    pub fn tags_for_owner(&self, owner_id: i64) -> Vec<i64> {
        let conn = self.tags();
        let mut stmt = conn
            .prepare(
                "SELECT tagid FROM TagProperties
                 WHERE property = 'rootsmagic_owner_id' AND value = ?1
                 ORDER BY tagid;",
            )
            .unwrap();
        let ids = stmt
            .query_map([owner_id.to_string()], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        ids
    }
}

fn rootsmagic_conn(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.create_collation("RMNOCASE", |left: &str, right: &str| -> Ordering {
        left.to_lowercase().cmp(&right.to_lowercase())
    })
    .unwrap();
    conn
}

/// Tag store wrapper failing every `create_node` after `allowed` successes,
/// and optionally every branch lookup once a transaction has committed.
pub struct FailingTagStore<S> {
    pub inner: S,
    allowed: usize,
    creates: Cell<usize>,
    fail_reads_after_commit: bool,
    committed: Cell<bool>,
}

impl<S: TagStore> FailingTagStore<S> {
    pub fn new(inner: S, allowed: usize) -> Self {
        Self {
            inner,
            allowed,
            creates: Cell::new(0),
            fail_reads_after_commit: false,
            committed: Cell::new(false),
        }
    }

    pub fn reads_fail_after_commit(inner: S) -> Self {
        Self {
            fail_reads_after_commit: true,
            ..Self::new(inner, usize::MAX)
        }
    }

    fn check_read(&self) -> TagRepoResult<()> {
        if self.fail_reads_after_commit && self.committed.get() {
            return Err(TagRepoError::InvalidData("injected read failure".to_string()));
        }
        Ok(())
    }
}

impl<S: TagStore> TagStore for FailingTagStore<S> {
    fn find_node_by_name(&self, name: &str) -> TagRepoResult<Option<TagId>> {
        self.check_read()?;
        self.inner.find_node_by_name(name)
    }

    fn find_child_by_name(&self, parent: TagId, name: &str) -> TagRepoResult<Option<TagId>> {
        self.inner.find_child_by_name(parent, name)
    }

    fn get_node(&self, id: TagId) -> TagRepoResult<Option<TagNode>> {
        self.inner.get_node(id)
    }

    fn create_node(&self, name: &str, parent: TagId, kind: TagKind) -> TagRepoResult<TagId> {
        if self.creates.get() >= self.allowed {
            return Err(TagRepoError::InvalidData("injected create failure".to_string()));
        }
        self.creates.set(self.creates.get() + 1);
        self.inner.create_node(name, parent, kind)
    }

    fn rename_node(&self, id: TagId, name: &str) -> TagRepoResult<()> {
        self.inner.rename_node(id, name)
    }

    fn reparent_node(&self, id: TagId, parent: TagId) -> TagRepoResult<()> {
        self.inner.reparent_node(id, parent)
    }

    fn delete_node(&self, id: TagId) -> TagRepoResult<()> {
        self.inner.delete_node(id)
    }

    fn get_property(&self, id: TagId, key: &str) -> TagRepoResult<Option<String>> {
        self.inner.get_property(id, key)
    }

    fn set_property(&self, id: TagId, key: &str, value: &str) -> TagRepoResult<()> {
        self.inner.set_property(id, key, value)
    }

    fn list_children(&self, parent: TagId) -> TagRepoResult<Vec<TagNode>> {
        self.check_read()?;
        self.inner.list_children(parent)
    }

    fn list_children_with_property(&self, parent: TagId, key: &str) -> TagRepoResult<Vec<TagId>> {
        self.inner.list_children_with_property(parent, key)
    }

    fn list_children_without_property(
        &self,
        parent: TagId,
        key: &str,
    ) -> TagRepoResult<Vec<TagId>> {
        self.inner.list_children_without_property(parent, key)
    }

    fn begin_transaction(&self) -> TagRepoResult<()> {
        self.inner.begin_transaction()
    }

    fn commit(&self) -> TagRepoResult<()> {
        self.inner.commit()?;
        self.committed.set(true);
        Ok(())
    }

    fn rollback(&self) -> TagRepoResult<()> {
        self.inner.rollback()
    }

    fn native_rollback(&self) -> bool {
        self.inner.native_rollback()
    }

    fn checkpoint(&self, roots: &[&str]) -> TagRepoResult<TagCheckpoint> {
        self.inner.checkpoint(roots)
    }

    fn restore(&self, checkpoint: &TagCheckpoint) -> TagRepoResult<()> {
        self.inner.restore(checkpoint)
    }
}
