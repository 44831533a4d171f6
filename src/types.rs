use serde::{Deserialize, Serialize};

/// Organization (tenant) identifier. All index and store state is
/// partitioned by it.
pub type OrgId = u32;

/// Stable series identifier assigned by the ingestion pipeline.
pub type SeriesId = String;

/// A metric series record as delivered by ingestion. The core is agnostic to
/// how the record was deserialized; it only needs the ID, the organization,
/// and the tag strings, each of the literal form `"key=value"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: SeriesId,
    pub org_id: OrgId,
    pub name: String,
    /// Ingestion interval in seconds.
    pub interval: u32,
    pub tags: Vec<String>,
}

/// Stored metadata for one series. Owned by the series store; the tag index
/// is derived from `record.tags` and is never the authoritative tag source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub record: MetricRecord,
    /// Partition the record was last ingested on.
    pub partition: i32,
}

impl SeriesMeta {
    /// Whether any of the series' tags carries the given key. Used by the
    /// query evaluator for absence tests, since the index stores no entry
    /// for "key absent".
    pub fn has_tag_key(&self, key: &str) -> bool {
        self.record.tags.iter().any(|tag| tag_key(tag) == Some(key))
    }
}

/// Splits a literal `"key=value"` tag into its parts. Returns `None` for
/// tags with no `=`, an empty key, or an empty value; such tags are never
/// indexed, because the index must not store empty-value entries.
pub fn split_tag(tag: &str) -> Option<(&str, &str)> {
    match tag.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => Some((key, value)),
        _ => None,
    }
}

/// Returns the key part of a `"key=value"` tag, if any. Unlike [`split_tag`]
/// an empty value still yields the key: `"k="` names the key `k` even though
/// the pair is not indexable.
pub fn tag_key(tag: &str) -> Option<&str> {
    match tag.split_once('=') {
        Some((key, _)) if !key.is_empty() => Some(key),
        _ => None,
    }
}
