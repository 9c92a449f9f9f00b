//! Start-up scripts run after migration and before statement preloading.
//!
//! # Invariants
//! - Scripts run in lexicographic filename order, each in its own transaction.
//! - A failing script is rolled back and reported; later scripts still run.

use crate::db::DbError;
use crate::source::{sorted_file_names, ScriptSource, SQL_SUFFIX};
use log::{error, info};
use rusqlite::Connection;

/// Runs every top-level `*.sql` entry of `source`.
pub fn run_init_scripts(conn: &mut Connection, source: &dyn ScriptSource) -> Vec<DbError> {
    let names = match sorted_file_names(source) {
        Ok(names) => names,
        Err(err) => {
            return vec![DbError::Source {
                name: "init source".to_string(),
                source: err,
            }];
        }
    };

    let mut errors = Vec::new();
    for name in names.iter().filter(|name| name.ends_with(SQL_SUFFIX)) {
        match run_one(conn, source, name) {
            Ok(()) => info!("event=init_script module=migrations status=ok file={name}"),
            Err(err) => {
                error!("event=init_script module=migrations status=error file={name} error={err}");
                errors.push(err);
            }
        }
    }
    errors
}

fn run_one(conn: &mut Connection, source: &dyn ScriptSource, name: &str) -> Result<(), DbError> {
    let sql = source.read(name).map_err(|source| DbError::Source {
        name: name.to_string(),
        source,
    })?;
    let tx = conn.transaction()?;
    tx.execute_batch(&sql).map_err(|source| DbError::Execute {
        file: name.to_string(),
        source,
    })?;
    tx.commit()?;
    Ok(())
}
