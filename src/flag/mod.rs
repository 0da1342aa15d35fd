use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ConfigError, SnapshotError};

// MODELS

/// Where a flag value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagValueSource {
    #[default]
    Server,
    Cache,
    Fallback,
}

/// One evaluated flag for an identity.
///
/// Only `value` decides whether a flag changed between snapshots. The remaining
/// metadata is carried through but never signals a change on its own.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRecord {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub variation: Option<i64>,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub flag_version: Option<i64>,
    #[serde(default)]
    pub track_events: Option<bool>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub debug_events_until_date: Option<DateTime<Utc>>,
    #[serde(default, rename = "reason")]
    pub evaluation_reason: Option<Value>,
    #[serde(default)]
    pub track_reason: Option<bool>,
}

/// Full known flag state for one identity at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlagSnapshot {
    flags: HashMap<String, FlagRecord>,
    source: FlagValueSource,
}

/// One key's transition between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFlag {
    pub key: String,
    pub old_value: Option<Value>,
    pub old_value_source: FlagValueSource,
    pub new_value: Option<Value>,
    pub new_value_source: FlagValueSource,
}

// IMPLEMENTATIONS

impl FlagValueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagValueSource::Server => "server",
            FlagValueSource::Cache => "cache",
            FlagValueSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for FlagValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagValueSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(FlagValueSource::Server),
            "cache" => Ok(FlagValueSource::Cache),
            "fallback" => Ok(FlagValueSource::Fallback),
            _ => Err(ConfigError::Invalid {
                name: "flag value source",
                value: s.to_string(),
            }),
        }
    }
}

impl FlagRecord {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_variation(mut self, variation: i64) -> Self {
        self.variation = Some(variation);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_flag_version(mut self, flag_version: i64) -> Self {
        self.flag_version = Some(flag_version);
        self
    }
}

impl FlagSnapshot {
    pub fn new(source: FlagValueSource) -> Self {
        Self {
            flags: HashMap::new(),
            source,
        }
    }

    /// Builds a snapshot from records, keyed by each record's `key`.
    /// A later record with a duplicate key replaces the earlier one.
    pub fn from_records(
        records: impl IntoIterator<Item = FlagRecord>,
        source: FlagValueSource,
    ) -> Self {
        let flags = records
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();
        Self { flags, source }
    }

    /// Parses the flag-collection dictionary format: a JSON object mapping each
    /// flag key to its record. The map key always wins over any `key` field in
    /// the record body.
    pub fn from_json(json: &str, source: FlagValueSource) -> Result<Self, SnapshotError> {
        let mut flags: HashMap<String, FlagRecord> = serde_json::from_str(json)?;
        for (key, record) in flags.iter_mut() {
            record.key.clone_from(key);
        }
        Ok(Self { flags, source })
    }

    pub fn load(path: impl AsRef<Path>, source: FlagValueSource) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json, source)
    }

    pub fn get(&self, key: &str) -> Option<&FlagRecord> {
        self.flags.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.flags.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.flags.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FlagRecord)> {
        self.flags.iter()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn source(&self) -> FlagValueSource {
        self.source
    }
}

impl ChangedFlag {
    /// Describes `key`'s transition from `old` to `new`. The old side's
    /// provenance is supplied by the caller, the new side's comes from the
    /// new snapshot itself.
    pub fn between(
        key: &str,
        old: &FlagSnapshot,
        old_source: FlagValueSource,
        new: &FlagSnapshot,
    ) -> Self {
        Self {
            key: key.to_string(),
            old_value: old.get(key).and_then(|record| record.value.clone()),
            old_value_source: old_source,
            new_value: new.get(key).and_then(|record| record.value.clone()),
            new_value_source: new.source(),
        }
    }
}
