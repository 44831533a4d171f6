//! Service orchestration: per-organization shards combining the series
//! store and the derived tag index, with ingestion-facing mutation and
//! query-facing reads.

use crate::error::IdxError;
use crate::index::TagIndex;
use crate::query::TagQuery;
use crate::store::SeriesStore;
use crate::telemetry::{noop_event_listener, IdxEvent, IdxEventListener};
use crate::types::{MetricRecord, OrgId, SeriesId, SeriesMeta};

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Configuration options for the metadata index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Whether tags are indexed at all. When off, records are still stored
    /// but the tag index stays empty and tag queries return empty sets.
    pub enable_tags: bool,
    /// Optional hard limit on distinct series per organization.
    pub max_series_per_org: Option<u64>,
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn IdxEventListener>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            enable_tags: true,
            max_series_per_org: None,
            event_listener: noop_event_listener(),
        }
    }
}

/// One organization's mutable state. Store and index are guarded by a single
/// lock so every mutation leaves them consistent atomically: for each series
/// S with tag `k=v`, the index holds S under `[k][v]`, and nothing else.
#[derive(Debug)]
struct OrgIndex {
    series: SeriesStore,
    tags: TagIndex,
}

impl OrgIndex {
    fn new(org: OrgId, limit: Option<u64>) -> Self {
        OrgIndex {
            series: SeriesStore::new(org, limit),
            tags: TagIndex::new(),
        }
    }
}

/// The multi-tenant metric-metadata index.
///
/// Ingestion and query paths share one instance. Mutations take the
/// organization's write lock; queries take its read lock, so reads run
/// concurrently with each other but never with a mutation. Returned ID sets
/// are copies and never observe later index mutation.
#[derive(Debug)]
pub struct MetaIndex {
    orgs: RwLock<HashMap<OrgId, Arc<RwLock<OrgIndex>>>>,
    config: IndexConfig,
}

impl MetaIndex {
    pub fn new() -> Self {
        Self::with_config(IndexConfig::default())
    }

    pub fn with_config(config: IndexConfig) -> Self {
        MetaIndex {
            orgs: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn org_shard(&self, org: OrgId) -> Result<Option<Arc<RwLock<OrgIndex>>>, IdxError> {
        Ok(self.orgs.read()?.get(&org).cloned())
    }

    fn org_shard_or_create(&self, org: OrgId) -> Result<Arc<RwLock<OrgIndex>>, IdxError> {
        if let Some(shard) = self.orgs.read()?.get(&org) {
            return Ok(shard.clone());
        }
        let mut orgs = self.orgs.write()?;
        Ok(orgs
            .entry(org)
            .or_insert_with(|| {
                Arc::new(RwLock::new(OrgIndex::new(org, self.config.max_series_per_org)))
            })
            .clone())
    }

    /// Inserts a new series or replaces an existing one's record, keeping
    /// the tag index consistent: stale key/value memberships are removed and
    /// new ones added before the call returns. Idempotent for identical
    /// input. Returns the (possibly new) series ID.
    ///
    /// # Errors
    /// Returns [`IdxError::CardinalityLimitExceeded`] when the record would
    /// create a new series beyond the configured per-organization limit; in
    /// that case nothing is mutated.
    pub fn add_or_update(&self, record: MetricRecord, partition: i32) -> Result<SeriesId, IdxError> {
        let org = record.org_id;
        let shard = self.org_shard_or_create(org)?;
        let mut guard = shard.write()?;

        let prev = guard.series.get(&record.id).cloned();
        if let Some(prev) = &prev {
            if prev.record == record && prev.partition == partition {
                return Ok(record.id);
            }
        }

        let id = record.id.clone();
        let meta = SeriesMeta { record, partition };
        if let Err(err) = guard.series.upsert(meta.clone()) {
            if let IdxError::CardinalityLimitExceeded { limit, .. } = &err {
                self.config
                    .event_listener
                    .on_event(IdxEvent::CardinalityLimitHit { org, limit: *limit });
            }
            return Err(err);
        }

        if self.config.enable_tags {
            if let Some(prev) = &prev {
                for tag in &prev.record.tags {
                    guard.tags.remove(&id, tag);
                }
            }
            for tag in &meta.record.tags {
                guard.tags.insert(&id, tag);
            }
        }

        let event = if prev.is_some() {
            IdxEvent::SeriesUpdated { org, id: id.clone() }
        } else {
            IdxEvent::SeriesAdded { org, id: id.clone() }
        };
        self.config.event_listener.on_event(event);
        Ok(id)
    }

    /// Metadata lookup. An unknown organization or series ID is an explicit
    /// `None`, not a fault.
    pub fn get(&self, org: OrgId, id: &str) -> Result<Option<SeriesMeta>, IdxError> {
        match self.org_shard(org)? {
            Some(shard) => Ok(shard.read()?.series.get(id).cloned()),
            None => Ok(None),
        }
    }

    /// Deletes every series whose *name* matches the glob `pattern` (`*`
    /// wildcard, full-string), removing each record and its tag index
    /// memberships atomically with respect to concurrent queries. Returns
    /// the deleted IDs, sorted; zero matches is not an error.
    pub fn delete(&self, org: OrgId, pattern: &str) -> Result<Vec<SeriesId>, IdxError> {
        let matcher = glob_to_regex(pattern)?;
        let Some(shard) = self.org_shard(org)? else {
            return Ok(Vec::new());
        };
        let mut guard = shard.write()?;

        let mut victims: Vec<SeriesId> = guard
            .series
            .by_id()
            .iter()
            .filter(|(_, meta)| matcher.is_match(&meta.record.name))
            .map(|(id, _)| id.clone())
            .collect();
        victims.sort();

        for id in &victims {
            if let Some(meta) = guard.series.remove(id) {
                for tag in &meta.record.tags {
                    guard.tags.remove(id, tag);
                }
                self.config
                    .event_listener
                    .on_event(IdxEvent::SeriesDeleted { org, id: id.clone() });
            }
        }
        Ok(victims)
    }

    /// Binds a compiled query to one organization's index and metadata
    /// store. Unknown organizations yield an empty set.
    pub fn ids_by_tag_query(
        &self,
        org: OrgId,
        query: &TagQuery,
    ) -> Result<HashSet<SeriesId>, IdxError> {
        if !self.config.enable_tags {
            return Ok(HashSet::new());
        }
        match self.org_shard(org)? {
            Some(shard) => {
                let guard = shard.read()?;
                query.run(&guard.tags, guard.series.by_id())
            }
            None => Ok(HashSet::new()),
        }
    }

    /// All tag keys currently live for the organization, sorted.
    pub fn tag_keys(&self, org: OrgId) -> Result<Vec<String>, IdxError> {
        match self.org_shard(org)? {
            Some(shard) => Ok(shard.read()?.tags.tag_keys()),
            None => Ok(Vec::new()),
        }
    }

    /// All values currently live under `key` for the organization, sorted.
    pub fn tag_values(&self, org: OrgId, key: &str) -> Result<Vec<String>, IdxError> {
        match self.org_shard(org)? {
            Some(shard) => Ok(shard.read()?.tags.tag_values(key)),
            None => Ok(Vec::new()),
        }
    }

    /// Number of live series for the organization.
    pub fn series_count(&self, org: OrgId) -> Result<usize, IdxError> {
        match self.org_shard(org)? {
            Some(shard) => Ok(shard.read()?.series.len()),
            None => Ok(0),
        }
    }

    /// Returns a reference to the configuration the index was built with.
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }
}

impl Default for MetaIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates a `*`-wildcard glob into an anchored regex; everything except
/// `*` matches literally, so an exact name behaves as an exact match.
fn glob_to_regex(pattern: &str) -> Result<Regex, IdxError> {
    let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Regex::new(&format!("^(?:{})$", escaped.join(".*"))).map_err(|_| IdxError::InvalidQuery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn record(org: OrgId, id: &str, tags: &[&str]) -> MetricRecord {
        MetricRecord {
            id: id.to_string(),
            org_id: org,
            name: id.to_string(),
            interval: 10,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[derive(Debug, Default)]
    struct CaptureListener(Mutex<Vec<IdxEvent>>);

    impl IdxEventListener for CaptureListener {
        fn on_event(&self, event: IdxEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn add_get_delete_roundtrip() {
        let idx = MetaIndex::new();
        idx.add_or_update(record(1, "a.b.c", &["host=server1"]), 3).unwrap();

        let meta = idx.get(1, "a.b.c").unwrap().unwrap();
        assert_eq!(meta.record.name, "a.b.c");
        assert_eq!(meta.partition, 3);
        assert!(idx.get(1, "nope").unwrap().is_none());
        assert!(idx.get(2, "a.b.c").unwrap().is_none());

        let deleted = idx.delete(1, "a.b.c").unwrap();
        assert_eq!(deleted, vec!["a.b.c".to_string()]);
        assert!(idx.get(1, "a.b.c").unwrap().is_none());
        assert_eq!(idx.series_count(1).unwrap(), 0);
    }

    #[test]
    fn delete_glob_matches_names() {
        let idx = MetaIndex::new();
        for name in ["cpu.user", "cpu.sys", "mem.free"] {
            idx.add_or_update(record(1, name, &[]), 0).unwrap();
        }

        let deleted = idx.delete(1, "cpu.*").unwrap();
        assert_eq!(deleted, vec!["cpu.sys".to_string(), "cpu.user".to_string()]);
        assert_eq!(idx.series_count(1).unwrap(), 1);

        // Zero matches and unknown organizations are not errors.
        assert!(idx.delete(1, "cpu.*").unwrap().is_empty());
        assert!(idx.delete(9, "*").unwrap().is_empty());
        // Glob metacharacters other than `*` are literal.
        assert!(idx.delete(1, "mem.fre.").unwrap().is_empty());
    }

    #[test]
    fn update_replaces_tag_memberships() {
        let idx = MetaIndex::new();
        idx.add_or_update(record(1, "app.req", &["env=prod", "dc=ams"]), 0).unwrap();
        idx.add_or_update(record(1, "app.req", &["env=prod", "region=eu"]), 0).unwrap();

        assert_eq!(idx.tag_keys(1).unwrap(), vec!["env", "region"]);
        assert!(idx.tag_values(1, "dc").unwrap().is_empty());
        assert_eq!(idx.tag_values(1, "env").unwrap(), vec!["prod"]);
        assert_eq!(idx.series_count(1).unwrap(), 1);
    }

    #[test]
    fn disabled_tags_store_but_do_not_index() {
        let mut cfg = IndexConfig::default();
        cfg.enable_tags = false;
        let idx = MetaIndex::with_config(cfg);

        idx.add_or_update(record(1, "a.b", &["host=server1"]), 0).unwrap();
        assert_eq!(
            idx.get(1, "a.b").unwrap().unwrap().record.tags,
            vec!["host=server1"]
        );
        assert!(idx.tag_keys(1).unwrap().is_empty());

        let query = TagQuery::new(&["host=server1"]).unwrap();
        assert!(idx.ids_by_tag_query(1, &query).unwrap().is_empty());
    }

    #[test]
    fn events_reflect_lifecycle() {
        let listener = Arc::new(CaptureListener::default());
        let mut cfg = IndexConfig::default();
        cfg.event_listener = listener.clone();
        let idx = MetaIndex::with_config(cfg);

        idx.add_or_update(record(1, "a.b", &["host=server1"]), 0).unwrap();
        // Identical input: idempotent, no event.
        idx.add_or_update(record(1, "a.b", &["host=server1"]), 0).unwrap();
        idx.add_or_update(record(1, "a.b", &["host=server2"]), 0).unwrap();
        idx.delete(1, "a.b").unwrap();

        let events = listener.0.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], IdxEvent::SeriesAdded { org: 1, id } if id == "a.b"));
        assert!(matches!(&events[1], IdxEvent::SeriesUpdated { org: 1, id } if id == "a.b"));
        assert!(matches!(&events[2], IdxEvent::SeriesDeleted { org: 1, id } if id == "a.b"));
    }

    #[test]
    fn cardinality_limit_emits_event_and_mutates_nothing() {
        let listener = Arc::new(CaptureListener::default());
        let mut cfg = IndexConfig::default();
        cfg.max_series_per_org = Some(1);
        cfg.event_listener = listener.clone();
        let idx = MetaIndex::with_config(cfg);

        idx.add_or_update(record(1, "a", &["k=v"]), 0).unwrap();
        let err = idx.add_or_update(record(1, "b", &["k=w"]), 0).unwrap_err();
        assert!(matches!(
            err,
            IdxError::CardinalityLimitExceeded {
                current: 1,
                limit: 1,
                org: 1,
            }
        ));
        assert_eq!(idx.series_count(1).unwrap(), 1);
        assert_eq!(idx.tag_values(1, "k").unwrap(), vec!["v"]);
        assert!(listener
            .0
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, IdxEvent::CardinalityLimitHit { org: 1, limit: 1 })));
    }
}
