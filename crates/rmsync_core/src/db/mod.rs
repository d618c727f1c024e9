//! SQLite connection bootstrap for both sides of a sync.
//!
//! # Responsibility
//! - Open the RootsMagic genealogy file read-only with its custom collation.
//! - Open the digiKam tag database read-write and verify the tables the
//!   tag store depends on.
//!
//! # Invariants
//! - The genealogy connection never writes.
//! - A tag connection is only returned once `Tags` and `TagProperties`
//!   carry every column the tag store queries.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
pub mod schema;

pub use open::{open_genealogy_db, open_tag_db, RMNOCASE_COLLATION};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Required table is absent from the opened database.
    MissingRequiredTable(&'static str),
    /// Required column is absent from an expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "database is missing required table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "database is missing required column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
