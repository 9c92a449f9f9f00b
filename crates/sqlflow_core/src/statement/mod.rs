//! Named statement loading and caching.
//!
//! # Responsibility
//! - Turn query files into named, prepared statements.
//! - Cache them per database wrapper with lazy fallback on a miss.
//!
//! # Invariants
//! - Full statement names are `base` for marker-free files and `base.sub`
//!   for every `-- name: sub` fragment.
//! - Compiled statements are immutable and shared through `Arc`.

mod cache;
mod compiler;

pub use cache::StatementCache;
pub use compiler::{compile, parse_fragments, CompiledStatement, Fragment};

use crate::db::{DbError, DbResult};
use rusqlite::{CachedStatement, Connection, Params, Row};

/// Prepares `statement` on `conn`, reusing the connection's cached handle.
pub(crate) fn prepare<'conn>(
    conn: &'conn Connection,
    statement: &CompiledStatement,
) -> DbResult<CachedStatement<'conn>> {
    conn.prepare_cached(&statement.sql)
        .map_err(|source| DbError::Compile {
            file: statement.file.clone(),
            line: statement.line,
            name: statement.name.clone(),
            source,
        })
}

pub(crate) fn execute<P: Params>(
    conn: &Connection,
    statement: &CompiledStatement,
    params: P,
) -> DbResult<usize> {
    prepare(conn, statement)?
        .execute(params)
        .map_err(|source| execution_error(statement, source))
}

pub(crate) fn query_row<T, P, F>(
    conn: &Connection,
    statement: &CompiledStatement,
    params: P,
    f: F,
) -> DbResult<T>
where
    P: Params,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    prepare(conn, statement)?
        .query_row(params, f)
        .map_err(|source| execution_error(statement, source))
}

pub(crate) fn query_all<T, P, F>(
    conn: &Connection,
    statement: &CompiledStatement,
    params: P,
    f: F,
) -> DbResult<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut prepared = prepare(conn, statement)?;
    let rows = prepared
        .query_map(params, f)
        .map_err(|source| execution_error(statement, source))?;
    rows.collect::<rusqlite::Result<Vec<T>>>()
        .map_err(|source| execution_error(statement, source))
}

fn execution_error(statement: &CompiledStatement, source: rusqlite::Error) -> DbError {
    DbError::Execute {
        file: statement.file.clone(),
        source,
    }
}
