//! Connection wrapper with version control and named statements.
//!
//! # Responsibility
//! - Build the version index, migrate, run init scripts and preload queries
//!   once at construction.
//! - Run named statements on the wrapped connection or inside a [`Tx`].
//!
//! # Invariants
//! - Construction always returns a usable wrapper; failures are collected
//!   into [`InitError`] instead of aborting.
//! - The version index and statement cache belong to exactly one wrapper.

use super::migrations::{self, MigrationError, VersionIndex};
use super::tx::Tx;
use super::{DbError, DbResult};
use crate::source::ScriptSource;
use crate::statement::{self, CompiledStatement, StatementCache};
use log::{error, info};
use rusqlite::{CachedStatement, Connection, InterruptHandle, Params, Row, TransactionBehavior};
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// How far construction migrates the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpgradeTarget {
    /// Skip migration, init scripts and statement preloading.
    Skip,
    /// Apply every available upgrade.
    #[default]
    All,
    /// Upgrade to at most this version. `Version(0)` behaves like `All`.
    Version(u32),
}

impl UpgradeTarget {
    /// Upgrade ceiling for the runner, `None` when migration is skipped.
    pub fn ceiling(self) -> Option<u32> {
        match self {
            Self::Skip => None,
            Self::All => Some(0),
            Self::Version(version) => Some(version),
        }
    }
}

/// Construction options for [`Database::new`].
#[derive(Debug, Default)]
pub struct Options {
    pub max_version: UpgradeTarget,
    /// Defer every statement compilation to first use and skip init scripts.
    pub no_preload: bool,
    /// Numbered `*.up.*` / `*.down.*` migration scripts.
    pub version_source: Option<Box<dyn ScriptSource>>,
    /// Scripts run once after migration, in filename order.
    pub init_source: Option<Box<dyn ScriptSource>>,
    /// Named statement files.
    pub query_source: Option<Box<dyn ScriptSource>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_version(mut self, max_version: UpgradeTarget) -> Self {
        self.max_version = max_version;
        self
    }

    pub fn no_preload(mut self, no_preload: bool) -> Self {
        self.no_preload = no_preload;
        self
    }

    pub fn version_source(mut self, source: impl ScriptSource + 'static) -> Self {
        self.version_source = Some(Box::new(source));
        self
    }

    pub fn init_source(mut self, source: impl ScriptSource + 'static) -> Self {
        self.init_source = Some(Box::new(source));
        self
    }

    pub fn query_source(mut self, source: impl ScriptSource + 'static) -> Self {
        self.query_source = Some(Box::new(source));
        self
    }
}

/// Every failure collected while constructing a [`Database`].
#[derive(Debug)]
pub struct InitError {
    errors: Vec<DbError>,
}

impl InitError {
    pub fn errors(&self) -> &[DbError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<DbError> {
        self.errors
    }
}

impl Display for InitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (idx, err) in self.errors.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl From<DbError> for InitError {
    fn from(value: DbError) -> Self {
        Self {
            errors: vec![value],
        }
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.errors.first().map(|err| err as &(dyn Error + 'static))
    }
}

/// SQLite connection with version control and named statements.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    versions: VersionIndex,
    version_source: Option<Box<dyn ScriptSource>>,
    statements: RefCell<StatementCache>,
    next_tx_id: u64,
}

impl Database {
    /// Wraps `conn`, migrating and preloading according to `options`.
    ///
    /// The wrapper is returned even when some step failed; it stays usable for
    /// every script and statement that did load.
    pub fn new(conn: Connection, options: Options) -> (Self, Result<(), InitError>) {
        let started_at = Instant::now();
        let Options {
            max_version,
            no_preload,
            version_source,
            init_source,
            query_source,
        } = options;
        let mut errors = Vec::new();

        let versions = match version_source.as_deref() {
            Some(source) => {
                let (index, index_errors) = VersionIndex::build(source);
                errors.extend(index_errors);
                index
            }
            None => VersionIndex::default(),
        };

        let mut db = Self {
            conn,
            versions,
            version_source,
            statements: RefCell::new(StatementCache::new(query_source)),
            next_tx_id: 1,
        };

        if let Some(ceiling) = max_version.ceiling() {
            if db.version_source.is_some() {
                if let Err(err) = db.upgrade(ceiling) {
                    errors.push(err.source);
                }
            }
            if !no_preload {
                if let Some(source) = init_source.as_deref() {
                    errors.extend(migrations::run_init_scripts(&mut db.conn, source));
                }
                errors.extend(db.statements.get_mut().load_all(&db.conn));
            }
        }

        let duration_ms = started_at.elapsed().as_millis();
        if errors.is_empty() {
            info!(
                "event=db_init module=db status=ok duration_ms={} statements={}",
                duration_ms,
                db.statements.get_mut().len()
            );
            (db, Ok(()))
        } else {
            error!(
                "event=db_init module=db status=error duration_ms={} errors={}",
                duration_ms,
                errors.len()
            );
            (db, Err(InitError { errors }))
        }
    }

    /// Like [`Database::new`] but rejects any construction failure.
    pub fn try_new(conn: Connection, options: Options) -> Result<Self, InitError> {
        let (db, result) = Self::new(conn, options);
        result.map(|()| db)
    }

    /// Current stored schema version.
    pub fn version(&self) -> DbResult<u32> {
        migrations::current_version(&self.conn)
    }

    /// Highest version with an upgrade script, or 0 without a version source.
    pub fn latest_version(&self) -> u32 {
        self.versions.latest_upgrade()
    }

    pub fn versions(&self) -> &VersionIndex {
        &self.versions
    }

    /// Upgrades to at most `target`; `0` applies every consecutive upgrade.
    pub fn upgrade(&mut self, target: u32) -> Result<u32, MigrationError> {
        match self.version_source.as_deref() {
            Some(source) => migrations::upgrade(&mut self.conn, &self.versions, source, target),
            None => self.version_without_scripts(),
        }
    }

    /// Downgrades to `target`.
    pub fn downgrade(&mut self, target: u32) -> Result<u32, MigrationError> {
        match self.version_source.as_deref() {
            Some(source) => migrations::downgrade(&mut self.conn, &self.versions, source, target),
            None => self.version_without_scripts(),
        }
    }

    fn version_without_scripts(&self) -> Result<u32, MigrationError> {
        self.version()
            .map_err(|source| MigrationError { reached: 0, source })
    }

    /// Compiles every query file not loaded yet, e.g. after `no_preload`.
    pub fn preload(&mut self) -> Result<(), InitError> {
        let errors = self.statements.get_mut().load_all(&self.conn);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(InitError { errors })
        }
    }

    /// Resolves `name` without preparing it.
    pub fn statement(&self, name: &str) -> DbResult<Arc<CompiledStatement>> {
        self.statements.borrow_mut().resolve(&self.conn, name)
    }

    /// Sorted names of every statement compiled so far.
    pub fn statement_names(&self) -> Vec<String> {
        self.statements.borrow().names()
    }

    /// Prepared handle for the named statement.
    pub fn named(&self, name: &str) -> DbResult<CachedStatement<'_>> {
        let statement = self.statement(name)?;
        statement::prepare(&self.conn, &statement)
    }

    /// Runs the named statement, returning the number of changed rows.
    pub fn execute<P: Params>(&self, name: &str, params: P) -> DbResult<usize> {
        let statement = self.statement(name)?;
        statement::execute(&self.conn, &statement, params)
    }

    /// Runs the named statement and maps its single expected row.
    pub fn query_row<T, P, F>(&self, name: &str, params: P, f: F) -> DbResult<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let statement = self.statement(name)?;
        statement::query_row(&self.conn, &statement, params, f)
    }

    /// Runs the named statement and maps every row.
    pub fn query_all<T, P, F>(&self, name: &str, params: P, f: F) -> DbResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let statement = self.statement(name)?;
        statement::query_all(&self.conn, &statement, params, f)
    }

    /// Starts a deferred transaction with its own statement bindings.
    pub fn transaction(&mut self) -> DbResult<Tx<'_>> {
        self.transaction_with_behavior(TransactionBehavior::Deferred)
    }

    pub fn transaction_with_behavior(&mut self, behavior: TransactionBehavior) -> DbResult<Tx<'_>> {
        let id = self.next_tx_id;
        self.next_tx_id += 1;
        let tx = self.conn.transaction_with_behavior(behavior)?;
        Ok(Tx::new(id, tx, &self.statements))
    }

    /// Handle that aborts the statement currently running on this connection.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }
}
