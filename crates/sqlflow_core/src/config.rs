//! Declarative construction settings.
//!
//! # Responsibility
//! - Describe `Options` in a serializable form for embedding applications.
//! - Map script directories onto [`DirSource`] handles.
//!
//! # Invariants
//! - A missing directory setting means "no source of that kind".
//! - `max_version` accepts a number, `"all"` or `"skip"`.

use crate::db::{Options, UpgradeTarget};
use crate::source::DirSource;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub max_version: UpgradeTarget,
    pub no_preload: bool,
    pub version_dir: Option<PathBuf>,
    pub init_dir: Option<PathBuf>,
    pub query_dir: Option<PathBuf>,
}

impl Config {
    pub fn into_options(self) -> Options {
        let mut options = Options::new()
            .max_version(self.max_version)
            .no_preload(self.no_preload);
        if let Some(dir) = self.version_dir {
            options = options.version_source(DirSource::new(dir));
        }
        if let Some(dir) = self.init_dir {
            options = options.init_source(DirSource::new(dir));
        }
        if let Some(dir) = self.query_dir {
            options = options.query_source(DirSource::new(dir));
        }
        options
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUpgradeTarget {
    Version(u32),
    Keyword(String),
}

impl<'de> Deserialize<'de> for UpgradeTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawUpgradeTarget::deserialize(deserializer)? {
            RawUpgradeTarget::Version(0) => Ok(Self::All),
            RawUpgradeTarget::Version(version) => Ok(Self::Version(version)),
            RawUpgradeTarget::Keyword(keyword) => match keyword.trim().to_ascii_lowercase().as_str() {
                "all" => Ok(Self::All),
                "skip" | "none" => Ok(Self::Skip),
                other => Err(serde::de::Error::custom(format!(
                    "unsupported max_version `{other}`; expected a number, all or skip"
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::db::UpgradeTarget;
    use std::path::PathBuf;

    #[test]
    fn empty_config_upgrades_everything_without_sources() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_version, UpgradeTarget::All);

        let options = config.into_options();
        assert!(options.version_source.is_none());
        assert!(options.query_source.is_none());
    }

    #[test]
    fn max_version_accepts_numbers_and_keywords() {
        let parse = |raw: &str| {
            serde_json::from_str::<Config>(&format!(r#"{{"max_version": {raw}}}"#))
                .map(|config| config.max_version)
        };

        assert_eq!(parse("3").unwrap(), UpgradeTarget::Version(3));
        assert_eq!(parse("0").unwrap(), UpgradeTarget::All);
        assert_eq!(parse(r#""skip""#).unwrap(), UpgradeTarget::Skip);
        assert_eq!(parse(r#""ALL""#).unwrap(), UpgradeTarget::All);
        assert!(parse(r#""sometimes""#).is_err());
        assert!(parse("-1").is_err());
    }

    #[test]
    fn directories_become_sources() {
        let config: Config = serde_json::from_str(
            r#"{"no_preload": true, "version_dir": "/srv/sql/versions", "query_dir": "/srv/sql/queries"}"#,
        )
        .unwrap();
        assert_eq!(config.version_dir, Some(PathBuf::from("/srv/sql/versions")));

        let options = config.into_options();
        assert!(options.no_preload);
        assert!(options.version_source.is_some());
        assert!(options.init_source.is_none());
        assert!(options.query_source.is_some());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<Config>(r#"{"max_versions": 2}"#).is_err());
    }
}
