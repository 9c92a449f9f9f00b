//! SQLite connection wrapper, schema migration and named statement entry points.
//!
//! # Responsibility
//! - Wrap a live SQLite connection with version control and named statements.
//! - Define the error taxonomy shared by migration and statement code.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Construction collects errors instead of failing fast; the wrapper stays
//!   usable for whatever did succeed.
//! - No code path in this module panics on database or source failures.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

mod database;
pub mod migrations;
mod open;
mod tx;

pub use database::{Database, InitError, Options, UpgradeTarget};
pub use migrations::{Direction, MigrationError, VersionIndex};
pub use open::{open_db, open_db_in_memory};
pub use tx::{BoundStatement, Tx};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// Listing or reading a script entry failed.
    Source { name: String, source: io::Error },
    /// SQL text failed to prepare.
    Compile {
        file: String,
        line: usize,
        name: String,
        source: rusqlite::Error,
    },
    /// A script failed while running.
    Execute {
        file: String,
        source: rusqlite::Error,
    },
    /// `PRAGMA user_version` could not be read.
    VersionRead(rusqlite::Error),
    /// `PRAGMA user_version` could not be written.
    VersionWrite {
        version: u32,
        source: rusqlite::Error,
    },
    StatementNotFound(String),
    /// Two query files produced the same full statement name.
    DuplicateStatement {
        name: String,
        file: String,
        existing: String,
    },
    /// A statement was requested but no query source is configured.
    NoQuerySource(String),
    Sqlite(rusqlite::Error),
}

impl DbError {
    /// Returns true when the error means "the script entry does not exist".
    pub fn is_missing_source(&self) -> bool {
        matches!(self, Self::Source { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source { name, source } => write!(f, "could not read `{name}`: {source}"),
            Self::Compile {
                file,
                line,
                name,
                source,
            } => write!(f, "[{file}:{line}] could not prepare `{name}`: {source}"),
            Self::Execute { file, source } => write!(f, "could not run SQL file `{file}`: {source}"),
            Self::VersionRead(err) => write!(f, "could not query user_version: {err}"),
            Self::VersionWrite { version, source } => {
                write!(f, "could not update user_version to {version}: {source}")
            }
            Self::StatementNotFound(name) => write!(f, "statement not found: `{name}`"),
            Self::DuplicateStatement {
                name,
                file,
                existing,
            } => write!(
                f,
                "statement `{name}` from `{file}` is already defined by `{existing}`"
            ),
            Self::NoQuerySource(name) => {
                write!(f, "no query source configured, cannot load statement `{name}`")
            }
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Source { source, .. } => Some(source),
            Self::Compile { source, .. } => Some(source),
            Self::Execute { source, .. } => Some(source),
            Self::VersionRead(err) => Some(err),
            Self::VersionWrite { source, .. } => Some(source),
            Self::Sqlite(err) => Some(err),
            Self::StatementNotFound(_)
            | Self::DuplicateStatement { .. }
            | Self::NoQuerySource(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
