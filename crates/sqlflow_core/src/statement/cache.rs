//! Name to compiled statement cache with lazy file loading.
//!
//! # Responsibility
//! - Hold every compiled statement for one database wrapper.
//! - Compile query files on demand when a name is not cached yet.
//!
//! # Invariants
//! - Entries are never evicted or replaced once registered.
//! - A full name belongs to exactly one file; later claims are rejected.
//! - The connection's prepared-statement capacity is kept at least as large as
//!   the number of cached statements.

use super::compiler::{compile, CompiledStatement};
use crate::db::{DbError, DbResult};
use crate::source::{sorted_file_names, ScriptSource, SQL_SUFFIX};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;

/// rusqlite's default prepared-statement cache capacity.
const MIN_PREPARED_CAPACITY: usize = 16;

#[derive(Debug, Default)]
pub struct StatementCache {
    source: Option<Box<dyn ScriptSource>>,
    entries: HashMap<String, Arc<CompiledStatement>>,
}

impl StatementCache {
    pub fn new(source: Option<Box<dyn ScriptSource>>) -> Self {
        Self {
            source,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<CompiledStatement>> {
        self.entries.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted names of every cached statement.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.entries.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Compiles every top-level `*.sql` file of the query source.
    ///
    /// Failures are collected per file; a broken file never prevents its
    /// siblings from loading.
    pub fn load_all(&mut self, conn: &Connection) -> Vec<DbError> {
        let Some(source) = self.source.as_deref() else {
            return Vec::new();
        };
        let names = match sorted_file_names(source) {
            Ok(names) => names,
            Err(err) => {
                return vec![DbError::Source {
                    name: "query source".to_string(),
                    source: err,
                }];
            }
        };

        let mut errors = Vec::new();
        for base in names.iter().filter_map(|name| name.strip_suffix(SQL_SUFFIX)) {
            match compile(conn, source, base) {
                Ok(compiled) => errors.extend(register(&mut self.entries, conn, compiled)),
                Err(err) => {
                    error!("event=statement_load module=statement status=error file={base}{SQL_SUFFIX} error={err}");
                    errors.push(err);
                }
            }
        }
        info!(
            "event=statement_preload module=statement status={} statements={} errors={}",
            if errors.is_empty() { "ok" } else { "error" },
            self.entries.len(),
            errors.len()
        );
        errors
    }

    /// Returns the statement registered as `name`, compiling on a miss.
    ///
    /// A miss tries the file named `name` first, then every dotted prefix from
    /// the longest down, so `users.by_id` resolves from `users.sql`.
    pub fn resolve(&mut self, conn: &Connection, name: &str) -> DbResult<Arc<CompiledStatement>> {
        if let Some(statement) = self.entries.get(name) {
            return Ok(Arc::clone(statement));
        }
        if self.source.is_none() {
            return Err(DbError::NoQuerySource(name.to_string()));
        }

        for base in candidate_files(name) {
            let compiled = match self.source.as_deref() {
                Some(source) => compile(conn, source, base),
                None => break,
            };
            match compiled {
                Ok(compiled) => {
                    for err in register(&mut self.entries, conn, compiled) {
                        warn!("event=statement_lazy_load module=statement status=error error={err}");
                    }
                    if let Some(statement) = self.entries.get(name) {
                        debug!("event=statement_lazy_load module=statement status=ok name={name} file={}", statement.file);
                        return Ok(Arc::clone(statement));
                    }
                }
                Err(err) if err.is_missing_source() => continue,
                Err(err) => return Err(err),
            }
        }

        Err(DbError::StatementNotFound(name.to_string()))
    }
}

/// Adds freshly compiled statements, keeping first registrations.
fn register(
    entries: &mut HashMap<String, Arc<CompiledStatement>>,
    conn: &Connection,
    compiled: Vec<CompiledStatement>,
) -> Vec<DbError> {
    let mut errors = Vec::new();
    for statement in compiled {
        match entries.get(&statement.name) {
            // Recompiling an already loaded file on a lazy miss.
            Some(existing) if existing.file == statement.file => {}
            Some(existing) => errors.push(DbError::DuplicateStatement {
                name: statement.name.clone(),
                file: statement.file.clone(),
                existing: existing.file.clone(),
            }),
            None => {
                entries.insert(statement.name.clone(), Arc::new(statement));
            }
        }
    }
    conn.set_prepared_statement_cache_capacity(entries.len().max(MIN_PREPARED_CAPACITY));
    errors
}

/// File base names that could define `name`, most specific first.
fn candidate_files(name: &str) -> impl Iterator<Item = &str> {
    std::iter::once(name).chain(name.rmatch_indices('.').map(move |(idx, _)| &name[..idx]))
}
