//! Flat, listable text-entry stores for migration, init and query scripts.
//!
//! # Responsibility
//! - Enumerate the top-level entries of a script store.
//! - Read one entry's text by name.
//!
//! # Invariants
//! - Listing is non-recursive; nested directories surface as `is_dir` entries
//!   and are skipped by every consumer.
//! - A missing entry is reported as `io::ErrorKind::NotFound` so callers can
//!   tell "absent" apart from other access failures.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

/// File suffix recognized for init and query scripts.
pub const SQL_SUFFIX: &str = ".sql";

/// One top-level entry of a [`ScriptSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub is_dir: bool,
}

impl SourceEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }
}

/// Read-only store of named script files.
pub trait ScriptSource: Debug + Send {
    /// Lists top-level entries.
    fn list(&self) -> io::Result<Vec<SourceEntry>>;

    /// Reads the full text of one entry.
    fn read(&self, name: &str) -> io::Result<String>;
}

/// Lists the non-directory entries of `source` sorted by name.
pub fn sorted_file_names(source: &dyn ScriptSource) -> io::Result<Vec<String>> {
    let mut names = source
        .list()?
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .map(|entry| entry.name)
        .collect::<Vec<_>>();
    names.sort();
    Ok(names)
}

/// Script source backed by one filesystem directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ScriptSource for DirSource {
    fn list(&self) -> io::Result<Vec<SourceEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                // Non UTF-8 names cannot be addressed by statement name.
                continue;
            };
            entries.push(SourceEntry {
                name,
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        Ok(entries)
    }

    fn read(&self, name: &str) -> io::Result<String> {
        // Entry names are flat; refuse anything that would escape the root.
        if name.contains('/') || name.contains('\\') || name == ".." {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("`{name}` is not a top-level entry"),
            ));
        }
        std::fs::read_to_string(self.root.join(name))
    }
}

/// Script source held in memory, e.g. bundled with `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, String>,
    dirs: Vec<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one file.
    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(name.into(), content.into());
        self
    }

    /// Adds a directory entry; directories are listed but never read.
    pub fn with_dir(mut self, name: impl Into<String>) -> Self {
        self.dirs.push(name.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.files.insert(name.into(), content.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.files.remove(name)
    }
}

impl<N, C> FromIterator<(N, C)> for MemorySource
where
    N: Into<String>,
    C: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, C)>>(iter: I) -> Self {
        let mut source = Self::new();
        for (name, content) in iter {
            source.insert(name, content);
        }
        source
    }
}

impl ScriptSource for MemorySource {
    fn list(&self) -> io::Result<Vec<SourceEntry>> {
        let files = self.files.keys().map(SourceEntry::file);
        let dirs = self.dirs.iter().map(|name| SourceEntry {
            name: name.clone(),
            is_dir: true,
        });
        Ok(files.chain(dirs).collect())
    }

    fn read(&self, name: &str) -> io::Result<String> {
        self.files.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no entry named `{name}`"))
        })
    }
}
