//! Query file parsing and statement preparation.
//!
//! # Responsibility
//! - Split one query file into named SQL fragments.
//! - Prepare every fragment against the live connection.
//!
//! # Invariants
//! - Blank lines and plain `--` comment lines never reach SQL text.
//! - `-- name: <token>` lines close the buffered fragment and are not content.
//! - A file either compiles completely or contributes nothing.
//! - Full names are unique within one file.

use crate::db::{DbError, DbResult};
use crate::source::{ScriptSource, SQL_SUFFIX};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::collections::HashSet;

static NAME_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^--\s*name:\s*(\S+)").expect("valid name marker regex"));

const COMMENT_PREFIX: &str = "--";

/// One unit of SQL text cut out of a query file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Marker token, `None` for text before the first marker.
    pub sub_name: Option<String>,
    /// 1-based line of the introducing marker, or the file's line count when
    /// the fragment has no marker.
    pub line: usize,
    pub sql: String,
}

impl Fragment {
    /// Fully qualified statement name for a file with base name `base`.
    pub fn full_name(&self, base: &str) -> String {
        match &self.sub_name {
            Some(sub_name) => format!("{base}.{sub_name}"),
            None => base.to_string(),
        }
    }
}

/// A fragment that prepared successfully against a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStatement {
    pub name: String,
    /// Source file, including the suffix.
    pub file: String,
    pub line: usize,
    pub sql: String,
}

/// Splits query file text into fragments.
pub fn parse_fragments(text: &str) -> Vec<Fragment> {
    let line_count = text.lines().count();
    let mut fragments = Vec::new();
    let mut sub_name: Option<String> = None;
    let mut marker_line: Option<usize> = None;
    let mut buffer: Vec<&str> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(captures) = NAME_MARKER_RE.captures(line) {
            flush(&mut fragments, &mut buffer, &sub_name, marker_line, line_count);
            sub_name = Some(captures[1].to_string());
            marker_line = Some(idx + 1);
        } else if !line.starts_with(COMMENT_PREFIX) {
            buffer.push(line);
        }
    }
    flush(&mut fragments, &mut buffer, &sub_name, marker_line, line_count);

    fragments
}

fn flush(
    fragments: &mut Vec<Fragment>,
    buffer: &mut Vec<&str>,
    sub_name: &Option<String>,
    marker_line: Option<usize>,
    line_count: usize,
) {
    if buffer.is_empty() {
        return;
    }
    fragments.push(Fragment {
        sub_name: sub_name.clone(),
        line: marker_line.unwrap_or(line_count),
        sql: buffer.join("\n"),
    });
    buffer.clear();
}

/// Reads `<base>.sql` from `source` and validates every fragment in it.
///
/// Fragments are checked with an uncached `prepare`; the connection's
/// statement cache fills on first execution.
pub fn compile(
    conn: &Connection,
    source: &dyn ScriptSource,
    base: &str,
) -> DbResult<Vec<CompiledStatement>> {
    let file = format!("{base}{SQL_SUFFIX}");
    let text = source.read(&file).map_err(|source| DbError::Source {
        name: file.clone(),
        source,
    })?;

    let mut seen = HashSet::new();
    parse_fragments(&text)
        .into_iter()
        .map(|fragment| {
            let name = fragment.full_name(base);
            if !seen.insert(name.clone()) {
                return Err(DbError::DuplicateStatement {
                    name,
                    file: file.clone(),
                    existing: file.clone(),
                });
            }
            if let Err(source) = conn.prepare(&fragment.sql) {
                return Err(DbError::Compile {
                    file: file.clone(),
                    line: fragment.line,
                    name,
                    source,
                });
            }
            Ok(CompiledStatement {
                name,
                file: file.clone(),
                line: fragment.line,
                sql: fragment.sql,
            })
        })
        .collect()
}
