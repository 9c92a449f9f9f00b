//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Wrap the connection in a [`Database`], migrating and preloading it.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - A database is only returned when construction reported no errors.

use super::database::{Database, InitError, Options};
use super::DbError;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and wraps it according to `options`.
///
/// # Side effects
/// - Applies pending migrations and preloads statements.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, options: Options) -> Result<Database, InitError> {
    open_with("file", || Connection::open(path), options)
}

/// Opens an in-memory SQLite database and wraps it according to `options`.
///
/// # Side effects
/// - Applies pending migrations and preloads statements.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory(options: Options) -> Result<Database, InitError> {
    open_with("memory", Connection::open_in_memory, options)
}

fn open_with(
    mode: &str,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
    options: Options,
) -> Result<Database, InitError> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match open().and_then(configure_connection) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(InitError::from(DbError::from(err)));
        }
    };

    match Database::try_new(conn, options) {
        Ok(db) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(db)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed errors={}",
                mode,
                started_at.elapsed().as_millis(),
                err.errors().len()
            );
            Err(err)
        }
    }
}

fn configure_connection(conn: Connection) -> rusqlite::Result<Connection> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}
