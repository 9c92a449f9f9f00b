//! SQLite migration runner driven by numbered script files.
//!
//! # Responsibility
//! - Walk the version index forward or backward from the stored version.
//! - Apply each step atomically: script content plus the version bump commit
//!   together or not at all.
//!
//! # Invariants
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - Steps are strictly sequential; each one re-reads the stored version.
//! - The first failing step stops the walk; earlier steps stay applied.
//! - A missing script is a normal stopping point, never an error.

use crate::db::{DbError, DbResult};
use crate::source::ScriptSource;
use log::{error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

mod index;
mod init;

pub use index::{Direction, VersionIndex};
pub use init::run_init_scripts;

/// Failure of an upgrade/downgrade walk.
///
/// `reached` is the last version the database was successfully moved to (or
/// the version it started at when the first step failed).
#[derive(Debug)]
pub struct MigrationError {
    pub reached: u32,
    pub source: DbError,
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "migration stopped at version {}: {}", self.reached, self.source)
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Reads the stored schema version.
pub fn current_version(conn: &Connection) -> DbResult<u32> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))
        .map_err(DbError::VersionRead)
}

/// Upgrades to at most `target`; `0` applies every consecutive upgrade.
///
/// Returns the version reached.
pub fn upgrade(
    conn: &mut Connection,
    index: &VersionIndex,
    source: &dyn ScriptSource,
    target: u32,
) -> Result<u32, MigrationError> {
    let mut reached = 0;
    loop {
        reached = current_version(conn).map_err(move |source| MigrationError { reached, source })?;
        if target > 0 && reached >= target {
            break;
        }
        let Some(next) = reached.checked_add(1) else {
            break;
        };
        let Some(file) = index.upgrade(next) else {
            break;
        };
        if !run_step(conn, source, Direction::Upgrade, file, next)
            .map_err(move |source| MigrationError { reached, source })?
        {
            break;
        }
    }
    Ok(reached)
}

/// Downgrades to `target`, one downgrade script per version.
///
/// Returns the version reached.
pub fn downgrade(
    conn: &mut Connection,
    index: &VersionIndex,
    source: &dyn ScriptSource,
    target: u32,
) -> Result<u32, MigrationError> {
    let mut reached = 0;
    loop {
        reached = current_version(conn).map_err(move |source| MigrationError { reached, source })?;
        if reached <= target {
            break;
        }
        let Some(file) = index.downgrade(reached) else {
            break;
        };
        if !run_step(conn, source, Direction::Downgrade, file, reached - 1)
            .map_err(move |source| MigrationError { reached, source })?
        {
            break;
        }
    }
    Ok(reached)
}

/// Runs one script and stores `version` in a single transaction.
///
/// Returns `Ok(false)` when the script vanished from the source since the
/// index was built.
fn run_step(
    conn: &mut Connection,
    source: &dyn ScriptSource,
    direction: Direction,
    file: &str,
    version: u32,
) -> DbResult<bool> {
    let started_at = Instant::now();
    let sql = match source.read(file) {
        Ok(sql) => sql,
        Err(err) => {
            let err = DbError::Source {
                name: file.to_string(),
                source: err,
            };
            if err.is_missing_source() {
                info!(
                    "event=migration_step module=migrations status=skipped direction={} file={} reason=missing",
                    direction.as_str(),
                    file
                );
                return Ok(false);
            }
            return Err(err);
        }
    };

    match apply_in_transaction(conn, file, &sql, version) {
        Ok(()) => {
            info!(
                "event=migration_step module=migrations status=ok direction={} file={} version={} duration_ms={}",
                direction.as_str(),
                file,
                version,
                started_at.elapsed().as_millis()
            );
            Ok(true)
        }
        Err(err) => {
            error!(
                "event=migration_step module=migrations status=error direction={} file={} version={} duration_ms={} error={}",
                direction.as_str(),
                file,
                version,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn apply_in_transaction(conn: &mut Connection, file: &str, sql: &str, version: u32) -> DbResult<()> {
    // Dropping `tx` before commit rolls back both the script and the bump.
    let tx = conn.transaction()?;
    tx.execute_batch(sql).map_err(|source| DbError::Execute {
        file: file.to_string(),
        source,
    })?;
    tx.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|source| DbError::VersionWrite { version, source })?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{current_version, downgrade, upgrade, VersionIndex};
    use crate::source::MemorySource;
    use rusqlite::Connection;

    fn scripts() -> MemorySource {
        MemorySource::new()
            .with_file("0001.up.sql", "CREATE TABLE a (id INTEGER);")
            .with_file("0001.down.sql", "DROP TABLE a;")
            .with_file("0002.up.sql", "CREATE TABLE b (id INTEGER);")
            .with_file("0002.down.sql", "DROP TABLE b;")
    }

    #[test]
    fn upgrade_then_downgrade_walks_both_directions() {
        let source = scripts();
        let (index, _) = VersionIndex::build(&source);
        let mut conn = Connection::open_in_memory().unwrap();

        assert_eq!(upgrade(&mut conn, &index, &source, 0).unwrap(), 2);
        assert_eq!(current_version(&conn).unwrap(), 2);
        assert_eq!(downgrade(&mut conn, &index, &source, 0).unwrap(), 0);
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn script_removed_after_indexing_stops_without_error() {
        let mut source = scripts();
        let (index, _) = VersionIndex::build(&source);
        source.remove("0002.up.sql");
        let mut conn = Connection::open_in_memory().unwrap();

        assert_eq!(upgrade(&mut conn, &index, &source, 0).unwrap(), 1);
    }

    #[test]
    fn failing_script_rolls_back_whole_step() {
        let source = MemorySource::new()
            .with_file("0001.up.sql", "CREATE TABLE a (id INTEGER); INSERT INTO missing VALUES (1);");
        let (index, _) = VersionIndex::build(&source);
        let mut conn = Connection::open_in_memory().unwrap();

        let err = upgrade(&mut conn, &index, &source, 0).unwrap_err();
        assert_eq!(err.reached, 0);
        assert_eq!(current_version(&conn).unwrap(), 0);
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'a';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 0);
    }
}
