//! Required-table checks for the two external schemas.
//!
//! Neither database is owned by this crate, so nothing here creates or
//! migrates tables. Checks only confirm the columns our queries touch.

use super::{DbError, DbResult};
use rusqlite::Connection;

/// digiKam tables and the columns the tag store reads or writes.
pub const TAG_STORE_TABLES: &[(&str, &[&str])] = &[
    ("Tags", &["id", "pid", "name", "icon", "iconkde"]),
    ("TagProperties", &["tagid", "property", "value"]),
];

/// RootsMagic tables and the columns the genealogy reader selects.
pub const GENEALOGY_TABLES: &[(&str, &[&str])] = &[
    (
        "NameTable",
        &["OwnerID", "Surname", "Given", "IsPrimary", "BirthYear", "DeathYear"],
    ),
    ("FamilyTable", &["FamilyID", "FatherID", "MotherID"]),
    ("ChildTable", &["ChildID", "FamilyID"]),
];

/// Verifies every `(table, columns)` pair exists on `conn`.
pub fn ensure_tables(
    conn: &Connection,
    required: &[(&'static str, &[&'static str])],
) -> DbResult<()> {
    for &(table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(DbError::MissingRequiredTable(table));
        }
        let present = table_columns(conn, table)?;
        for &column in columns {
            if !present.iter().any(|name| name.eq_ignore_ascii_case(column)) {
                return Err(DbError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

pub fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\");"))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(row.get::<_, String>(1)?);
    }
    Ok(columns)
}
