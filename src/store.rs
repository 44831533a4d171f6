//! Per-organization series metadata store: the authoritative mapping from
//! series ID to the series' tag set and descriptive fields.

use crate::error::IdxError;
use crate::types::{OrgId, SeriesId, SeriesMeta};
use std::collections::HashMap;

/// Authoritative per-organization series map, with an optional hard limit
/// on distinct series to prevent high-cardinality abuse and ensure
/// predictable resource usage.
#[derive(Debug)]
pub struct SeriesStore {
    org: OrgId,
    series: HashMap<SeriesId, SeriesMeta>,
    /// Optional hard limit on distinct series (None = no limit).
    limit: Option<u64>,
}

impl SeriesStore {
    pub fn new(org: OrgId, limit: Option<u64>) -> Self {
        SeriesStore {
            org,
            series: HashMap::new(),
            limit,
        }
    }

    pub fn get(&self, id: &str) -> Option<&SeriesMeta> {
        self.series.get(id)
    }

    /// Inserts or replaces a series record, returning the previous record if
    /// one existed. Inserting a *new* series beyond the cardinality limit
    /// fails without mutating anything; replacing an existing series never
    /// counts against the limit.
    pub fn upsert(&mut self, meta: SeriesMeta) -> Result<Option<SeriesMeta>, IdxError> {
        if !self.series.contains_key(&meta.record.id) {
            if let Some(limit) = self.limit {
                let current = self.series.len() as u64;
                if current + 1 > limit {
                    return Err(IdxError::CardinalityLimitExceeded {
                        current,
                        limit,
                        org: self.org,
                    });
                }
            }
        }
        Ok(self.series.insert(meta.record.id.clone(), meta))
    }

    /// Removes a series record. Returns `None` when the ID was not present;
    /// removal is idempotent.
    pub fn remove(&mut self, id: &str) -> Option<SeriesMeta> {
        self.series.remove(id)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// The full ID → metadata view the query evaluator consumes.
    pub fn by_id(&self) -> &HashMap<SeriesId, SeriesMeta> {
        &self.series
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricRecord;

    fn meta(id: &str, tags: &[&str]) -> SeriesMeta {
        SeriesMeta {
            record: MetricRecord {
                id: id.to_string(),
                org_id: 1,
                name: id.to_string(),
                interval: 10,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
            partition: 0,
        }
    }

    #[test]
    fn upsert_get_remove_roundtrip() {
        let mut store = SeriesStore::new(1, None);
        assert!(store.upsert(meta("id1", &["host=server1"])).unwrap().is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("id1").unwrap().record.tags, vec!["host=server1"]);

        let prev = store.upsert(meta("id1", &["host=server2"])).unwrap();
        assert_eq!(prev.unwrap().record.tags, vec!["host=server1"]);
        assert_eq!(store.len(), 1);

        assert!(store.remove("id1").is_some());
        assert!(store.remove("id1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn limit_allows_exactly_at_limit() {
        let mut store = SeriesStore::new(1, Some(2));
        store.upsert(meta("id1", &[])).unwrap();
        store.upsert(meta("id2", &[])).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn limit_rejects_new_series_over_limit() {
        let mut store = SeriesStore::new(7, Some(2));
        store.upsert(meta("id1", &[])).unwrap();
        store.upsert(meta("id2", &[])).unwrap();

        let err = store.upsert(meta("id3", &[])).unwrap_err();
        assert!(matches!(
            err,
            IdxError::CardinalityLimitExceeded {
                current: 2,
                limit: 2,
                org: 7,
            }
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn limit_ignores_replacement_of_existing_series() {
        let mut store = SeriesStore::new(1, Some(1));
        store.upsert(meta("id1", &["a=1"])).unwrap();
        store.upsert(meta("id1", &["a=2"])).unwrap();
        assert_eq!(store.get("id1").unwrap().record.tags, vec!["a=2"]);
    }
}
