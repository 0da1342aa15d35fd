use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

use crate::diff::DiffOptions;
use crate::error::ConfigError;
use crate::flag::FlagValueSource;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub old_snapshot: PathBuf,
    pub new_snapshot: PathBuf,
    pub old_source: FlagValueSource,
    pub new_source: FlagValueSource,
    pub null_matches_missing: bool,
    pub log_filter: String,
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv().is_ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let old_snapshot = PathBuf::from(required("FLAG_OLD_SNAPSHOT")?);
        let new_snapshot = PathBuf::from(required("FLAG_NEW_SNAPSHOT")?);

        let old_source = parse_source(&lookup, "FLAG_OLD_SOURCE", FlagValueSource::Cache)?;
        let new_source = parse_source(&lookup, "FLAG_NEW_SOURCE", FlagValueSource::Server)?;

        let null_matches_missing = match lookup("FLAG_NULL_MATCHES_MISSING") {
            Some(value) => value.trim().parse::<bool>().map_err(|_| ConfigError::Invalid {
                name: "FLAG_NULL_MATCHES_MISSING",
                value,
            })?,
            None => true,
        };

        let log_filter = lookup("FLAG_LOG").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            old_snapshot,
            new_snapshot,
            old_source,
            new_source,
            null_matches_missing,
            log_filter,
        })
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            null_matches_missing: self.null_matches_missing,
        }
    }
}

fn parse_source(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: FlagValueSource,
) -> Result<FlagValueSource, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("FLAG_OLD_SNAPSHOT", "old.json"),
            ("FLAG_NEW_SNAPSHOT", "new.json"),
        ]))
        .unwrap();

        assert_eq!(config.old_snapshot, PathBuf::from("old.json"));
        assert_eq!(config.new_snapshot, PathBuf::from("new.json"));
        assert_eq!(config.old_source, FlagValueSource::Cache);
        assert_eq!(config.new_source, FlagValueSource::Server);
        assert!(config.null_matches_missing);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.diff_options(), DiffOptions::default());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("FLAG_OLD_SNAPSHOT", "a.json"),
            ("FLAG_NEW_SNAPSHOT", "b.json"),
            ("FLAG_OLD_SOURCE", "fallback"),
            ("FLAG_NEW_SOURCE", "cache"),
            ("FLAG_NULL_MATCHES_MISSING", "false"),
            ("FLAG_LOG", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.old_source, FlagValueSource::Fallback);
        assert_eq!(config.new_source, FlagValueSource::Cache);
        assert!(!config.diff_options().null_matches_missing);
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn test_missing_snapshot_path() {
        let result = Config::from_lookup(lookup(&[("FLAG_OLD_SNAPSHOT", "a.json")]));
        assert_eq!(result.unwrap_err(), ConfigError::Missing("FLAG_NEW_SNAPSHOT"));
    }

    #[test]
    fn test_invalid_values() {
        let result = Config::from_lookup(lookup(&[
            ("FLAG_OLD_SNAPSHOT", "a.json"),
            ("FLAG_NEW_SNAPSHOT", "b.json"),
            ("FLAG_OLD_SOURCE", "disk"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { name: "FLAG_OLD_SOURCE", .. })
        ));

        let result = Config::from_lookup(lookup(&[
            ("FLAG_OLD_SNAPSHOT", "a.json"),
            ("FLAG_NEW_SNAPSHOT", "b.json"),
            ("FLAG_NULL_MATCHES_MISSING", "maybe"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { name: "FLAG_NULL_MATCHES_MISSING", .. })
        ));
    }
}
