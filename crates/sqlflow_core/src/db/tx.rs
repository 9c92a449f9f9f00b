//! Transaction with its own named statement bindings.
//!
//! # Responsibility
//! - Bind cached statements to one transaction on first use.
//! - Reuse those bindings for the rest of the transaction.
//!
//! # Invariants
//! - Base compiled statements are never mutated; binding produces a new handle
//!   prepared on the transaction.
//! - Bindings are never shared between transactions and die with the `Tx`.
//! - Dropping a `Tx` without `commit` rolls it back.

use super::DbResult;
use crate::statement::{self, CompiledStatement, StatementCache};
use log::debug;
use rusqlite::{CachedStatement, Params, Row, Transaction};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A named statement prepared inside one transaction.
pub struct BoundStatement<'tx> {
    statement: Arc<CompiledStatement>,
    tx_id: u64,
    prepared: CachedStatement<'tx>,
}

impl BoundStatement<'_> {
    /// Base statement this handle was bound from.
    pub fn statement(&self) -> &Arc<CompiledStatement> {
        &self.statement
    }

    /// Id of the transaction this handle belongs to.
    pub fn tx_id(&self) -> u64 {
        self.tx_id
    }
}

impl<'tx> Deref for BoundStatement<'tx> {
    type Target = CachedStatement<'tx>;

    fn deref(&self) -> &Self::Target {
        &self.prepared
    }
}

impl DerefMut for BoundStatement<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.prepared
    }
}

/// In-flight transaction started by [`super::Database::transaction`].
pub struct Tx<'db> {
    id: u64,
    tx: Transaction<'db>,
    cache: &'db RefCell<StatementCache>,
    /// Names bound in this transaction. The bound handle itself is the
    /// `prepare_cached` entry prepared on `tx`; the map only skips the shared
    /// cache lookup on reuse.
    bound: HashMap<String, Arc<CompiledStatement>>,
}

impl<'db> Tx<'db> {
    pub(super) fn new(id: u64, tx: Transaction<'db>, cache: &'db RefCell<StatementCache>) -> Self {
        debug!("event=tx_begin module=db status=ok tx_id={id}");
        Self {
            id,
            tx,
            cache,
            bound: HashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of statements bound in this transaction so far.
    pub fn bound_len(&self) -> usize {
        self.bound.len()
    }

    /// Statement bound to this transaction, binding it on first use.
    pub fn named(&mut self, name: &str) -> DbResult<BoundStatement<'_>> {
        let statement = self.bind(name)?;
        let prepared = statement::prepare(&self.tx, &statement)?;
        Ok(BoundStatement {
            statement,
            tx_id: self.id,
            prepared,
        })
    }

    pub fn execute<P: Params>(&mut self, name: &str, params: P) -> DbResult<usize> {
        let statement = self.bind(name)?;
        statement::execute(&self.tx, &statement, params)
    }

    pub fn query_row<T, P, F>(&mut self, name: &str, params: P, f: F) -> DbResult<T>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let statement = self.bind(name)?;
        statement::query_row(&self.tx, &statement, params, f)
    }

    pub fn query_all<T, P, F>(&mut self, name: &str, params: P, f: F) -> DbResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let statement = self.bind(name)?;
        statement::query_all(&self.tx, &statement, params, f)
    }

    /// Raw transaction, for SQL that is not a named statement.
    pub fn transaction(&self) -> &Transaction<'db> {
        &self.tx
    }

    pub fn commit(self) -> DbResult<()> {
        self.tx.commit()?;
        debug!("event=tx_end module=db status=commit tx_id={}", self.id);
        Ok(())
    }

    pub fn rollback(self) -> DbResult<()> {
        self.tx.rollback()?;
        debug!("event=tx_end module=db status=rollback tx_id={}", self.id);
        Ok(())
    }

    fn bind(&mut self, name: &str) -> DbResult<Arc<CompiledStatement>> {
        if let Some(statement) = self.bound.get(name) {
            return Ok(Arc::clone(statement));
        }
        let statement = self.cache.borrow_mut().resolve(&self.tx, name)?;
        self.bound.insert(name.to_string(), Arc::clone(&statement));
        debug!("event=tx_bind module=db status=ok tx_id={} name={name}", self.id);
        Ok(statement)
    }
}
