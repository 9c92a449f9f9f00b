use rusqlite::{params, TransactionBehavior};
use sqlflow_core::{open_db_in_memory, Database, DbError, MemorySource, Options};
use std::sync::Arc;

fn open(no_preload: bool) -> Database {
    let versions = MemorySource::new().with_file(
        "0001.up.sql",
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL, balance INTEGER NOT NULL);",
    );
    let queries = MemorySource::new()
        .with_file(
            "accounts.sql",
            "-- name: open\nINSERT INTO accounts (owner, balance) VALUES (?1, ?2);\n\
             -- name: deposit\nUPDATE accounts SET balance = balance + ?2 WHERE owner = ?1;\n\
             -- name: balance\nSELECT balance FROM accounts WHERE owner = ?1;\n",
        )
        .with_file("account_count.sql", "SELECT COUNT(*) FROM accounts;");
    open_db_in_memory(
        Options::new()
            .no_preload(no_preload)
            .version_source(versions)
            .query_source(queries),
    )
    .unwrap()
}

fn account_count(db: &Database) -> i64 {
    db.query_row("account_count", [], |row| row.get(0)).unwrap()
}

#[test]
fn same_name_in_one_transaction_reuses_its_binding() {
    let mut db = open(false);
    let base = db.statement("accounts.open").unwrap();
    let mut tx = db.transaction().unwrap();

    let (first_tx, first_statement) = {
        let bound = tx.named("accounts.open").unwrap();
        (bound.tx_id(), Arc::clone(bound.statement()))
    };
    let (second_tx, second_statement) = {
        let bound = tx.named("accounts.open").unwrap();
        (bound.tx_id(), Arc::clone(bound.statement()))
    };

    assert_eq!(first_tx, tx.id());
    assert_eq!(second_tx, tx.id());
    assert!(Arc::ptr_eq(&first_statement, &second_statement));
    assert!(Arc::ptr_eq(&first_statement, &base));
    assert_eq!(tx.bound_len(), 1);
    tx.commit().unwrap();
}

#[test]
fn each_transaction_gets_independent_bindings() {
    let mut db = open(false);

    let mut first = db.transaction().unwrap();
    first.execute("accounts.open", params!["ada", 10]).unwrap();
    let first_id = first.id();
    assert_eq!(first.bound_len(), 1);
    first.commit().unwrap();

    let mut second = db.transaction().unwrap();
    assert_eq!(second.bound_len(), 0);
    let bound = second.named("accounts.open").unwrap();
    assert_ne!(bound.tx_id(), first_id);
    drop(bound);
    second.rollback().unwrap();
}

#[test]
fn commit_persists_and_rollback_discards_named_writes() {
    let mut db = open(false);

    let mut tx = db.transaction().unwrap();
    tx.execute("accounts.open", params!["ada", 10]).unwrap();
    tx.execute("accounts.deposit", params!["ada", 5]).unwrap();
    let balance: i64 = tx
        .query_row("accounts.balance", ["ada"], |row| row.get(0))
        .unwrap();
    assert_eq!(balance, 15);
    tx.commit().unwrap();

    let mut tx = db.transaction().unwrap();
    tx.execute("accounts.open", params!["grace", 1]).unwrap();
    let owners: Vec<i64> = tx.query_all("account_count", [], |row| row.get(0)).unwrap();
    assert_eq!(owners, vec![2]);
    tx.rollback().unwrap();

    assert_eq!(account_count(&db), 1);
    let balance: i64 = db
        .query_row("accounts.balance", ["ada"], |row| row.get(0))
        .unwrap();
    assert_eq!(balance, 15);
}

#[test]
fn dropping_a_transaction_rolls_it_back() {
    let mut db = open(false);
    {
        let mut tx = db
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();
        tx.execute("accounts.open", params!["ada", 1]).unwrap();
    }
    assert_eq!(account_count(&db), 0);
}

#[test]
fn lazily_bound_statement_is_shared_with_the_database_cache() {
    let mut db = open(true);
    assert!(db.statement_names().is_empty());

    let mut tx = db.transaction().unwrap();
    tx.execute("accounts.open", params!["ada", 1]).unwrap();
    tx.commit().unwrap();

    assert_eq!(
        db.statement_names(),
        vec!["accounts.balance", "accounts.deposit", "accounts.open"]
    );
}

#[test]
fn unknown_statement_in_transaction_is_not_found() {
    let mut db = open(false);
    let mut tx = db.transaction().unwrap();
    assert!(matches!(
        tx.execute("accounts.close", [1]),
        Err(DbError::StatementNotFound(_))
    ));
    assert_eq!(tx.bound_len(), 0);
}

#[test]
fn bound_statement_runs_inside_its_transaction() {
    let mut db = open(false);
    let mut tx = db.transaction().unwrap();
    tx.execute("accounts.open", params!["ada", 7]).unwrap();

    let tx_id = tx.id();
    let mut bound = tx.named("accounts.balance").unwrap();
    assert_eq!(bound.tx_id(), tx_id);
    let balance: i64 = bound.query_row(["ada"], |row| row.get(0)).unwrap();
    assert_eq!(balance, 7);
    drop(bound);
    tx.rollback().unwrap();

    assert!(matches!(
        db.query_row("accounts.balance", ["ada"], |row| row.get::<_, i64>(0)),
        Err(DbError::Execute { source: rusqlite::Error::QueryReturnedNoRows, .. })
    ));
}
