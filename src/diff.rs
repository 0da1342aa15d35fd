//! Decides which flag keys changed their served value between two snapshots.

use serde_json::Value;
use std::collections::HashSet;

use crate::flag::{FlagRecord, FlagSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Treat a record with no value and a record whose value is JSON `null` as equal.
    pub null_matches_missing: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            null_matches_missing: true,
        }
    }
}

/// Returns the keys whose effective served value differs between `old` and `new`.
///
/// A key present in only one snapshot is always reported. A key present in both
/// is reported only when its value differs; version bumps and metadata changes
/// (`flag_version`, `track_events`, `debug_events_until_date`, the evaluation
/// reason, `track_reason`) are ignored. An empty result means "nothing changed".
pub fn changed_keys(old: &FlagSnapshot, new: &FlagSnapshot, options: DiffOptions) -> HashSet<String> {
    coarse_changes(old, new)
        .into_iter()
        .filter(|key| match (old.get(key), new.get(key)) {
            (Some(old_record), Some(new_record)) => {
                !matches_value(old_record, new_record, options)
            }
            _ => true,
        })
        .map(str::to_string)
        .collect()
}

// Keys present on one side only, or present on both with any field differing.
fn coarse_changes<'a>(old: &'a FlagSnapshot, new: &'a FlagSnapshot) -> HashSet<&'a str> {
    let mut keys: HashSet<&str> = old
        .iter()
        .filter(|(key, record)| new.get(key) != Some(*record))
        .map(|(key, _)| key.as_str())
        .collect();
    keys.extend(
        new.keys()
            .filter(|key| !old.contains_key(key))
            .map(String::as_str),
    );
    keys
}

fn matches_value(old: &FlagRecord, new: &FlagRecord, options: DiffOptions) -> bool {
    match (normalize(&old.value, options), normalize(&new.value, options)) {
        (None, None) => true,
        (Some(a), Some(b)) => values_match(a, b),
        _ => false,
    }
}

fn normalize(value: &Option<Value>, options: DiffOptions) -> Option<&Value> {
    match value {
        Some(Value::Null) if options.null_matches_missing => None,
        other => other.as_ref(),
    }
}

/// Deep equality where numbers compare numerically, so `1` matches `1.0`.
/// Two integers compare exactly, without passing through `f64`.
pub fn values_match(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_f64() || y.is_f64() {
                return match (x.as_f64(), y.as_f64()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                };
            }
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_u64().is_some() && x.as_u64() == y.as_u64(),
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_match(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, x)| y.get(key).is_some_and(|y| values_match(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::FlagValueSource;
    use chrono::Utc;
    use serde_json::json;

    fn snapshot(records: Vec<FlagRecord>) -> FlagSnapshot {
        FlagSnapshot::from_records(records, FlagValueSource::Server)
    }

    fn diff(old: &FlagSnapshot, new: &FlagSnapshot) -> HashSet<String> {
        changed_keys(old, new, DiffOptions::default())
    }

    fn keys(list: &[&str]) -> HashSet<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_identical_snapshots() {
        let flags = snapshot(vec![
            FlagRecord::new("a", true).with_variation(0).with_version(3),
            FlagRecord::new("b", json!({"color": "red"})),
        ]);
        assert!(diff(&flags, &flags.clone()).is_empty());
    }

    #[test]
    fn test_both_empty() {
        assert!(diff(&FlagSnapshot::default(), &FlagSnapshot::default()).is_empty());
    }

    #[test]
    fn test_value_change_with_version_bump() {
        let old = snapshot(vec![FlagRecord::new("flagA", true).with_version(1)]);
        let new = snapshot(vec![FlagRecord::new("flagA", false).with_version(2)]);
        assert_eq!(diff(&old, &new), keys(&["flagA"]));
    }

    #[test]
    fn test_version_bump_same_value() {
        let old = snapshot(vec![FlagRecord::new("flagA", true).with_version(1)]);
        let new = snapshot(vec![FlagRecord::new("flagA", true).with_version(2)]);
        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn test_variation_change_same_value() {
        let old = snapshot(vec![FlagRecord::new("flagA", "x").with_variation(0)]);
        let new = snapshot(vec![FlagRecord::new("flagA", "x").with_variation(1)]);
        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn test_value_change_same_version() {
        let old = snapshot(vec![FlagRecord::new("flagA", 1).with_version(5)]);
        let new = snapshot(vec![FlagRecord::new("flagA", 2).with_version(5)]);
        assert_eq!(diff(&old, &new), keys(&["flagA"]));
    }

    #[test]
    fn test_metadata_only_changes_ignored() {
        let base = FlagRecord::new("flagA", "on").with_variation(1).with_version(7);
        let mut changed = base.clone().with_flag_version(99);
        changed.track_events = Some(true);
        changed.debug_events_until_date = Some(Utc::now());
        changed.evaluation_reason = Some(json!({"kind": "RULE_MATCH"}));
        changed.track_reason = Some(true);

        let old = snapshot(vec![base]);
        let new = snapshot(vec![changed]);
        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn test_added_and_removed_keys() {
        let old = snapshot(vec![FlagRecord::new("gone", 1), FlagRecord::new("kept", 1)]);
        let new = snapshot(vec![FlagRecord::new("kept", 1), FlagRecord::new("fresh", 1)]);
        assert_eq!(diff(&old, &new), keys(&["gone", "fresh"]));
    }

    #[test]
    fn test_added_key_with_null_value() {
        let old = snapshot(vec![]);
        let new = snapshot(vec![FlagRecord::new("nothing", Value::Null)]);
        assert_eq!(diff(&old, &new), keys(&["nothing"]));
    }

    #[test]
    fn test_null_matches_missing_value() {
        let explicit_null = FlagRecord::new("flagA", Value::Null).with_version(1);
        let mut missing = FlagRecord::new("flagA", 0).with_version(2);
        missing.value = None;

        let old = snapshot(vec![explicit_null]);
        let new = snapshot(vec![missing]);
        assert!(diff(&old, &new).is_empty());

        let strict = DiffOptions {
            null_matches_missing: false,
        };
        assert_eq!(changed_keys(&old, &new, strict), keys(&["flagA"]));
    }

    #[test]
    fn test_numeric_values_compare_numerically() {
        let old = snapshot(vec![FlagRecord::new("limit", json!(10)).with_version(1)]);
        let new = snapshot(vec![FlagRecord::new("limit", json!(10.0)).with_version(2)]);
        assert!(diff(&old, &new).is_empty());
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let old = snapshot(vec![FlagRecord::new("id", json!(9_007_199_254_740_993_u64))]);
        let new = snapshot(vec![FlagRecord::new("id", json!(9_007_199_254_740_992_u64))]);
        assert_eq!(diff(&old, &new), keys(&["id"]));

        assert!(values_match(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!values_match(&json!(u64::MAX), &json!(u64::MAX - 1)));
        assert!(!values_match(&json!(-1), &json!(u64::MAX)));
        assert!(values_match(&json!(-5), &json!(-5.0)));
    }

    #[test]
    fn test_nested_value_change() {
        let old = snapshot(vec![FlagRecord::new("cfg", json!({"a": [1, 2], "b": {"c": true}}))]);
        let new = snapshot(vec![FlagRecord::new("cfg", json!({"a": [1, 2], "b": {"c": false}}))]);
        assert_eq!(diff(&old, &new), keys(&["cfg"]));
    }

    #[test]
    fn test_values_match() {
        assert!(values_match(&json!([1, "a"]), &json!([1.0, "a"])));
        assert!(!values_match(&json!([1, 2]), &json!([2, 1])));
        assert!(!values_match(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!values_match(&json!("1"), &json!(1)));
        assert!(values_match(&Value::Null, &Value::Null));
    }
}
