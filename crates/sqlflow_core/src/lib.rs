//! Schema versioning and named SQL statements on top of SQLite.
//!
//! SQL lives in files instead of code. Numbered `*.up.sql` / `*.down.sql`
//! scripts move the database between versions tracked in
//! `PRAGMA user_version`; query files are compiled into statements addressed
//! by name (`users`, or `users.by_id` for `-- name: by_id` fragments).
//!
//! ```no_run
//! use sqlflow_core::{open_db, DirSource, Options};
//!
//! let db = open_db(
//!     "app.db",
//!     Options::new()
//!         .version_source(DirSource::new("sql/versions"))
//!         .query_source(DirSource::new("sql/queries")),
//! )?;
//! let name: String = db.query_row("users.name_by_id", [1], |row| row.get(0))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod db;
pub mod logging;
pub mod source;
pub mod statement;

pub use config::Config;
pub use db::{
    open_db, open_db_in_memory, BoundStatement, Database, DbError, DbResult, Direction, InitError,
    MigrationError, Options, Tx, UpgradeTarget, VersionIndex,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use source::{DirSource, MemorySource, ScriptSource, SourceEntry};
pub use statement::{CompiledStatement, Fragment};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
