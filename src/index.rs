//! The inverted tag index: mapping from tag key and value to the set of
//! series IDs currently carrying that exact pair.
//!
//! The index is derived state. It is kept consistent with the series store
//! by the single mutation path in [`crate::core`], and it stores no entry
//! for "key absent": absence is plain non-membership, checked against the
//! metadata records at query time.

use crate::types::{split_tag, SeriesId};
use std::collections::{HashMap, HashSet};

/// Two-level inverted index: `key → value → set of series IDs`.
///
/// Buckets are created lazily on first insertion and pruned as soon as they
/// empty. Bucket existence is observable through the listing operations, so
/// a retained empty bucket is a correctness bug, not merely wasted memory.
#[derive(Debug, Default)]
pub struct TagIndex {
    keys: HashMap<String, HashMap<String, HashSet<SeriesId>>>,
}

impl TagIndex {
    pub fn new() -> Self {
        TagIndex::default()
    }

    /// Adds `id` under the `"key=value"` tag, creating the key and value
    /// buckets as needed. Malformed tags (no `=`, empty key or value) are
    /// skipped; re-inserting an existing membership is a silent no-op.
    pub fn insert(&mut self, id: &str, tag: &str) {
        let Some((key, value)) = split_tag(tag) else {
            return;
        };
        self.keys
            .entry(key.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default()
            .insert(id.to_string());
    }

    /// Removes `id` from under the `"key=value"` tag, deleting the value
    /// bucket when its ID set empties and the key bucket when its value map
    /// empties. This is the only way buckets shrink. Removing a non-member
    /// is a silent no-op.
    pub fn remove(&mut self, id: &str, tag: &str) {
        let Some((key, value)) = split_tag(tag) else {
            return;
        };
        let Some(values) = self.keys.get_mut(key) else {
            return;
        };
        if let Some(ids) = values.get_mut(value) {
            ids.remove(id);
            if ids.is_empty() {
                values.remove(value);
            }
        }
        if values.is_empty() {
            self.keys.remove(key);
        }
    }

    /// The ID set under an exact key/value pair.
    pub fn ids(&self, key: &str, value: &str) -> Option<&HashSet<SeriesId>> {
        self.keys.get(key).and_then(|values| values.get(value))
    }

    /// The value → ID-set map under a key.
    pub fn values(&self, key: &str) -> Option<&HashMap<String, HashSet<SeriesId>>> {
        self.keys.get(key)
    }

    /// All live tag keys, sorted.
    pub fn tag_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All live values under `key`, sorted. Empty when the key has no bucket.
    pub fn tag_values(&self, key: &str) -> Vec<String> {
        let mut values: Vec<String> = self
            .keys
            .get(key)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default();
        values.sort();
        values
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of live (key, value) pairs.
    pub fn pair_count(&self) -> usize {
        self.keys.values().map(|values| values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
