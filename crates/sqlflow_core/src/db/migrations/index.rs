//! Version number to migration script lookup.
//!
//! # Invariants
//! - Built once from a source listing; never re-scanned.
//! - At most one script per (direction, version). Among duplicates the
//!   lexicographically last filename wins.

use crate::db::DbError;
use crate::source::{sorted_file_names, ScriptSource};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid version regex"));

const UPGRADE_MARKER: &str = ".up.";
const DOWNGRADE_MARKER: &str = ".down.";

/// Migration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
        }
    }
}

/// In-memory map of version numbers to upgrade/downgrade script names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionIndex {
    upgrades: BTreeMap<u32, String>,
    downgrades: BTreeMap<u32, String>,
}

impl VersionIndex {
    /// Scans `source` and classifies every top-level file.
    ///
    /// A listing failure is returned alongside an empty index.
    pub fn build(source: &dyn ScriptSource) -> (Self, Vec<DbError>) {
        let mut index = Self::default();
        let names = match sorted_file_names(source) {
            Ok(names) => names,
            Err(err) => {
                return (
                    index,
                    vec![DbError::Source {
                        name: "version source".to_string(),
                        source: err,
                    }],
                );
            }
        };

        for name in names {
            let Some((direction, version)) = classify(&name) else {
                continue;
            };
            if let Some(shadowed) = index.map_mut(direction).insert(version, name.clone()) {
                warn!(
                    "event=version_index_duplicate module=migrations status=ok direction={} version={} kept={} ignored={}",
                    direction.as_str(),
                    version,
                    name,
                    shadowed
                );
            }
        }

        (index, Vec::new())
    }

    /// Script that moves the database from `version - 1` to `version`.
    pub fn upgrade(&self, version: u32) -> Option<&str> {
        self.upgrades.get(&version).map(String::as_str)
    }

    /// Script that moves the database from `version` to `version - 1`.
    pub fn downgrade(&self, version: u32) -> Option<&str> {
        self.downgrades.get(&version).map(String::as_str)
    }

    /// Highest version with an upgrade script, or 0 when there is none.
    pub fn latest_upgrade(&self) -> u32 {
        self.upgrades.keys().next_back().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.upgrades.is_empty() && self.downgrades.is_empty()
    }

    fn map_mut(&mut self, direction: Direction) -> &mut BTreeMap<u32, String> {
        match direction {
            Direction::Upgrade => &mut self.upgrades,
            Direction::Downgrade => &mut self.downgrades,
        }
    }
}

/// Extracts (direction, version) from a script filename.
///
/// The version is the first digit run; names without one, with version 0, or
/// without a direction marker are not migration scripts.
fn classify(name: &str) -> Option<(Direction, u32)> {
    let version = VERSION_RE.find(name)?.as_str().parse::<u32>().ok()?;
    if version == 0 {
        return None;
    }
    if name.contains(UPGRADE_MARKER) {
        Some((Direction::Upgrade, version))
    } else if name.contains(DOWNGRADE_MARKER) {
        Some((Direction::Downgrade, version))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, Direction, VersionIndex};
    use crate::source::{MemorySource, ScriptSource, SourceEntry};
    use std::io;

    #[derive(Debug)]
    struct BrokenSource;

    impl ScriptSource for BrokenSource {
        fn list(&self) -> io::Result<Vec<SourceEntry>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }

        fn read(&self, _name: &str) -> io::Result<String> {
            unreachable!("index must not read content")
        }
    }

    #[test]
    fn classify_reads_first_digit_run_and_direction() {
        assert_eq!(classify("0001.up.sql"), Some((Direction::Upgrade, 1)));
        assert_eq!(classify("v12_users.down.sql"), Some((Direction::Downgrade, 12)));
        assert_eq!(classify("3.up.2.sql"), Some((Direction::Upgrade, 3)));
        assert_eq!(classify("0000.up.sql"), None);
        assert_eq!(classify("readme.up.sql"), None);
        assert_eq!(classify("0004.sql"), None);
        assert_eq!(classify("99999999999999999999.up.sql"), None);
    }

    #[test]
    fn build_maps_both_directions_and_skips_directories() {
        let source = MemorySource::new()
            .with_file("0001.up.sql", "")
            .with_file("0001.down.sql", "")
            .with_file("0002.up.sql", "")
            .with_file("notes.txt", "")
            .with_dir("0003.up.sql");

        let (index, errors) = VersionIndex::build(&source);
        assert!(errors.is_empty());
        assert_eq!(index.upgrade(1), Some("0001.up.sql"));
        assert_eq!(index.upgrade(2), Some("0002.up.sql"));
        assert_eq!(index.upgrade(3), None);
        assert_eq!(index.downgrade(1), Some("0001.down.sql"));
        assert_eq!(index.downgrade(2), None);
        assert_eq!(index.latest_upgrade(), 2);
    }

    #[test]
    fn duplicate_version_keeps_lexicographically_last_name() {
        let source = MemorySource::new()
            .with_file("0002_b.up.sql", "")
            .with_file("0002_a.up.sql", "")
            .with_file("2_z.up.sql", "");

        let (index, errors) = VersionIndex::build(&source);
        assert!(errors.is_empty());
        assert_eq!(index.upgrade(2), Some("2_z.up.sql"));
    }

    #[test]
    fn listing_failure_returns_empty_index_and_error() {
        let (index, errors) = VersionIndex::build(&BrokenSource);
        assert!(index.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("version source"));
    }
}
