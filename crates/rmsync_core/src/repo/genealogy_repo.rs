//! Genealogy source contracts and the RootsMagic SQLite reader.
//!
//! # Responsibility
//! - Read primary-name people and families from a RootsMagic database.
//! - Resolve each person's family as the minimum `FamilyID` among families
//!   listing them as a child.
//!
//! # Invariants
//! - Read-only: no statement here writes.
//! - NULL text columns are read as empty strings, NULL numbers as `0`.

use crate::db::schema::{ensure_tables, GENEALOGY_TABLES};
use crate::db::DbError;
use crate::model::genealogy::{FamilyRow, PersonRow};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type GenealogyResult<T> = Result<T, GenealogyRepoError>;

#[derive(Debug)]
pub enum GenealogyRepoError {
    Db(DbError),
}

impl Display for GenealogyRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "genealogy query failed: {err}"),
        }
    }
}

impl Error for GenealogyRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for GenealogyRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GenealogyRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Read interface over a genealogy dataset.
pub trait GenealogySource {
    /// Lists one row per primary name record, ordered by owner id.
    fn list_primary_people(&self) -> GenealogyResult<Vec<PersonRow>>;
    /// Lists families with their parents' primary names joined in.
    fn list_families(&self) -> GenealogyResult<Vec<FamilyRow>>;
}

/// RootsMagic-backed genealogy source.
pub struct SqliteGenealogySource<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGenealogySource<'conn> {
    /// Creates the source from a connection carrying RootsMagic tables.
    pub fn try_new(conn: &'conn Connection) -> GenealogyResult<Self> {
        ensure_tables(conn, GENEALOGY_TABLES)?;
        Ok(Self { conn })
    }
}

impl GenealogySource for SqliteGenealogySource<'_> {
    fn list_primary_people(&self) -> GenealogyResult<Vec<PersonRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                n.OwnerID,
                COALESCE(n.Given, ''),
                COALESCE(n.Surname, ''),
                COALESCE(n.BirthYear, 0),
                COALESCE(n.DeathYear, 0),
                COALESCE(
                    (SELECT MIN(c.FamilyID) FROM ChildTable c WHERE c.ChildID = n.OwnerID),
                    0
                )
             FROM NameTable n
             WHERE n.IsPrimary = 1
             ORDER BY n.OwnerID ASC, n.rowid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut people = Vec::new();
        while let Some(row) = rows.next()? {
            people.push(PersonRow {
                owner_id: row.get(0)?,
                given_name: row.get(1)?,
                surname: row.get(2)?,
                birth_year: row.get(3)?,
                death_year: row.get(4)?,
                family_id: row.get(5)?,
            });
        }
        Ok(people)
    }

    fn list_families(&self) -> GenealogyResult<Vec<FamilyRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                f.FamilyID,
                COALESCE(f.FatherID, 0),
                COALESCE(f.MotherID, 0),
                COALESCE(father.Given, ''),
                COALESCE(father.Surname, ''),
                COALESCE(mother.Given, ''),
                COALESCE(mother.Surname, '')
             FROM FamilyTable f
             LEFT JOIN NameTable father
               ON father.OwnerID = f.FatherID AND father.IsPrimary = 1
             LEFT JOIN NameTable mother
               ON mother.OwnerID = f.MotherID AND mother.IsPrimary = 1
             ORDER BY f.FamilyID ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut families = Vec::new();
        while let Some(row) = rows.next()? {
            families.push(FamilyRow {
                family_id: row.get(0)?,
                father_owner_id: row.get(1)?,
                mother_owner_id: row.get(2)?,
                father_given: row.get(3)?,
                father_surname: row.get(4)?,
                mother_given: row.get(5)?,
                mother_surname: row.get(6)?,
            });
        }
        Ok(families)
    }
}
