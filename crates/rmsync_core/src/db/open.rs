//! Connection openers for the genealogy and tag databases.
//!
//! # Invariants
//! - Genealogy connections are `SQLITE_OPEN_READ_ONLY` and have `RMNOCASE`
//!   registered before any query runs.
//! - Tag connections have a busy timeout and a verified schema.

use super::schema::{ensure_tables, GENEALOGY_TABLES, TAG_STORE_TABLES};
use super::DbResult;
use log::{error, info, warn};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

/// Collation name RootsMagic declares on its text columns.
pub const RMNOCASE_COLLATION: &str = "RMNOCASE";

/// Opens a RootsMagic database read-only.
///
/// # Side effects
/// - Registers the `RMNOCASE` collation; failure to do so is logged and
///   tolerated because simple selects may still succeed without it.
/// - Emits `db_open` events with duration and status.
pub fn open_genealogy_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let started_at = Instant::now();
    let path = path.as_ref();
    info!("event=db_open module=db status=start role=genealogy");

    let conn = match Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    ) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error role=genealogy duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    if let Err(err) = register_rmnocase(&conn) {
        warn!(
            "event=collation_register module=db status=error collation={} error={}",
            RMNOCASE_COLLATION, err
        );
    }

    match ensure_tables(&conn, GENEALOGY_TABLES) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok role=genealogy duration_ms={} path={}",
                started_at.elapsed().as_millis(),
                path.display()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error role=genealogy duration_ms={} error_code=db_schema_invalid error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Opens a digiKam database for tag mutation.
///
/// The file must already exist; digiKam owns its creation.
pub fn open_tag_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let started_at = Instant::now();
    let path = path.as_ref();
    info!("event=db_open module=db status=start role=tags");

    let conn = match Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    ) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error role=tags duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_tag_connection(&conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok role=tags duration_ms={} path={}",
                started_at.elapsed().as_millis(),
                path.display()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error role=tags duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_tag_connection(conn: &Connection) -> DbResult<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    ensure_tables(conn, TAG_STORE_TABLES)
}

fn register_rmnocase(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_collation(RMNOCASE_COLLATION, |left: &str, right: &str| {
        left.to_lowercase().cmp(&right.to_lowercase())
    })
}
