//! Immutable snapshots and merge change detection.

use crate::error::{ConfigError, Result};
use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// An immutable point-in-time view of all configuration key/value pairs.
///
/// Snapshots are replaced wholesale on every successful merge and never
/// mutated in place, so a reference obtained from
/// [`Store::snapshot`](crate::store::Store::snapshot) stays internally
/// consistent for as long as it is held.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Snapshot {
    values: HashMap<String, Value>,
}

impl Snapshot {
    /// An empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_map(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    pub(crate) fn insert(&mut self, key: String, value: Value) {
        self.values.insert(key, value);
    }

    /// Returns the value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Whether `key` is set.
    pub fn exists(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of keys in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over all key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Checks that every given key is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::StrictKeyMissing`] naming the first missing key.
    pub(crate) fn check_strict_keys(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            if !self.exists(key) {
                return Err(ConfigError::StrictKeyMissing(key.clone()));
            }
        }
        Ok(())
    }
}

/// How a key changed in one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The key was absent and is now set.
    Added,
    /// The key was set and its value changed.
    Updated,
    /// The key was retracted by the loader that owned it.
    Removed,
}

/// One entry of the changed-key set computed by a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChange {
    /// The affected key.
    pub key: String,
    /// How it changed.
    pub kind: ChangeKind,
    /// The new value; `None` for removals.
    pub value: Option<Value>,
}

/// Computes the changed-key set for one merge, restricted to the
/// triggering loader's prior and new key ownership. Results are sorted by
/// key so downstream dispatch is deterministic.
pub(crate) fn compute_changes(
    prev: &Snapshot,
    candidate: &HashMap<String, Value>,
    prior_owned: &HashSet<String>,
    incoming: &HashMap<String, Value>,
) -> Vec<KeyChange> {
    let mut changes = Vec::new();

    for (key, value) in incoming {
        match prev.get(key) {
            None => changes.push(KeyChange {
                key: key.clone(),
                kind: ChangeKind::Added,
                value: Some(value.clone()),
            }),
            Some(old) if old != value => changes.push(KeyChange {
                key: key.clone(),
                kind: ChangeKind::Updated,
                value: Some(value.clone()),
            }),
            Some(_) => {}
        }
    }

    for key in prior_owned {
        if !incoming.contains_key(key) && !candidate.contains_key(key) && prev.exists(key) {
            changes.push(KeyChange {
                key: key.clone(),
                kind: ChangeKind::Removed,
                value: None,
            });
        }
    }

    changes.sort_by(|a, b| a.key.cmp(&b.key));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, i64)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Int(*v)))
            .collect()
    }

    #[test]
    fn test_strict_keys_ok() {
        let snap = Snapshot::from_map(map(&[("a", 1), ("b", 2)]));
        assert!(snap
            .check_strict_keys(&["a".to_string(), "b".to_string()])
            .is_ok());
    }

    #[test]
    fn test_strict_keys_missing() {
        let snap = Snapshot::from_map(map(&[("a", 1)]));
        let err = snap
            .check_strict_keys(&["a".to_string(), "b".to_string()])
            .unwrap_err();
        assert!(matches!(err, ConfigError::StrictKeyMissing(key) if key == "b"));
    }

    #[test]
    fn test_changes_added_updated_removed() {
        let prev = Snapshot::from_map(map(&[("keep", 1), ("change", 2), ("gone", 3)]));
        let prior: HashSet<String> = ["change", "gone"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let incoming = map(&[("change", 20), ("new", 4)]);
        // candidate = prev minus prior, plus incoming
        let mut candidate = map(&[("keep", 1)]);
        candidate.extend(incoming.clone());

        let changes = compute_changes(&prev, &candidate, &prior, &incoming);
        let keys: Vec<(&str, ChangeKind)> = changes
            .iter()
            .map(|c| (c.key.as_str(), c.kind))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("change", ChangeKind::Updated),
                ("gone", ChangeKind::Removed),
                ("new", ChangeKind::Added),
            ]
        );
    }

    #[test]
    fn test_changes_idempotent() {
        let prev = Snapshot::from_map(map(&[("a", 1), ("b", 2)]));
        let prior: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let incoming = map(&[("a", 1), ("b", 2)]);
        let candidate = incoming.clone();

        let changes = compute_changes(&prev, &candidate, &prior, &incoming);
        assert!(changes.is_empty());
    }
}
