//! Tag query compilation and evaluation.
//!
//! A query is an ordered list of textual clauses (`key=value`, `key!=value`,
//! `key=~pattern`, `key!=~pattern`). Compilation turns them into a closed
//! clause enum, validated up front so evaluation never sees a malformed
//! pattern; evaluation seeds a candidate set from the cheapest positive
//! clause and progressively narrows it, so cost is bounded by the smallest
//! positive match rather than the full series population.

use crate::error::IdxError;
use crate::index::TagIndex;
use crate::types::{SeriesId, SeriesMeta};
use rayon::prelude::*;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// A compiled MATCH/NOT_MATCH pattern with full-string semantics.
///
/// Empty patterns compile no regex: the empty string is never a stored tag
/// value, so an empty pattern is an absence test handled without regex
/// machinery.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    re: Option<Regex>,
}

impl Pattern {
    fn compile(raw: &str) -> Result<Self, IdxError> {
        if raw.is_empty() {
            return Ok(Pattern {
                raw: String::new(),
                re: None,
            });
        }
        // Anchored: a substring hit is not a match.
        let re = Regex::new(&format!("^(?:{})$", raw)).map_err(|_| IdxError::InvalidQuery)?;
        Ok(Pattern {
            raw: raw.to_string(),
            re: Some(re),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.re.is_none()
    }

    fn matches(&self, value: &str) -> bool {
        self.re.as_ref().map_or(value.is_empty(), |re| re.is_match(value))
    }
}

/// One compiled filter clause. The operators are mutually exclusive by
/// construction and the evaluator dispatches with an exhaustive match.
///
/// An empty value/pattern on `Equal`/`Match` encodes "this key must be
/// absent from the series' tag set".
#[derive(Debug, Clone)]
pub enum TagExpr {
    Equal { key: String, value: String },
    NotEqual { key: String, value: String },
    Match { key: String, pattern: Pattern },
    NotMatch { key: String, pattern: Pattern },
}

impl TagExpr {
    /// Parses one raw clause. The longest operator token wins, scanning
    /// left-to-right: `!=~` before `=~` before `!=` before `=`. Returns
    /// `Ok(None)` for clauses that are legal but carry no constraint
    /// (NOT_EQUAL/NOT_MATCH with an empty value).
    fn parse(raw: &str) -> Result<Option<TagExpr>, IdxError> {
        let bytes = raw.as_bytes();
        let eq = raw.find('=').ok_or(IdxError::InvalidQuery)?;
        let negated = eq > 0 && bytes[eq - 1] == b'!';
        let is_pattern = bytes.get(eq + 1) == Some(&b'~');

        let key_end = if negated { eq - 1 } else { eq };
        let value_start = if is_pattern { eq + 2 } else { eq + 1 };
        let key = &raw[..key_end];
        let value = &raw[value_start..];
        if key.is_empty() {
            return Err(IdxError::InvalidQuery);
        }

        let expr = match (negated, is_pattern) {
            (false, false) => Some(TagExpr::Equal {
                key: key.to_string(),
                value: value.to_string(),
            }),
            (false, true) => Some(TagExpr::Match {
                key: key.to_string(),
                pattern: Pattern::compile(value)?,
            }),
            (true, false) if value.is_empty() => None,
            (true, false) => Some(TagExpr::NotEqual {
                key: key.to_string(),
                value: value.to_string(),
            }),
            (true, true) if value.is_empty() => None,
            (true, true) => Some(TagExpr::NotMatch {
                key: key.to_string(),
                pattern: Pattern::compile(value)?,
            }),
        };
        Ok(expr)
    }

    pub fn key(&self) -> &str {
        match self {
            TagExpr::Equal { key, .. }
            | TagExpr::NotEqual { key, .. }
            | TagExpr::Match { key, .. }
            | TagExpr::NotMatch { key, .. } => key,
        }
    }

    /// Whether this clause can seed evaluation. A positive assertion of a
    /// non-empty value is the only clause family that bounds the candidate
    /// set without a full index scan.
    pub fn is_seed(&self) -> bool {
        match self {
            TagExpr::Equal { value, .. } => !value.is_empty(),
            TagExpr::Match { pattern, .. } => !pattern.is_empty(),
            TagExpr::NotEqual { .. } | TagExpr::NotMatch { .. } => false,
        }
    }

    /// The candidate set this seed-eligible clause selects: an owned copy,
    /// never aliasing the live index.
    fn seed_candidates(&self, index: &TagIndex) -> HashSet<SeriesId> {
        match self {
            TagExpr::Equal { key, value } => {
                index.ids(key, value).cloned().unwrap_or_default()
            }
            TagExpr::Match { key, pattern } => matching_ids(index, key, pattern),
            TagExpr::NotEqual { .. } | TagExpr::NotMatch { .. } => HashSet::new(),
        }
    }

    /// Narrows `candidates` by this clause.
    fn filter(
        &self,
        candidates: HashSet<SeriesId>,
        index: &TagIndex,
        series_by_id: &HashMap<SeriesId, SeriesMeta>,
    ) -> HashSet<SeriesId> {
        match self {
            TagExpr::Equal { key, value } if !value.is_empty() => {
                let ids = index.ids(key, value);
                candidates
                    .into_par_iter()
                    .filter(|id| ids.map_or(false, |ids| ids.contains(id)))
                    .collect()
            }
            // An empty value or pattern is an absence test. The index stores
            // no entry for "key absent", so consult the metadata records.
            TagExpr::Equal { key, .. } => keep_absent(candidates, key, series_by_id),
            TagExpr::Match { key, pattern } if !pattern.is_empty() => {
                let matching = matching_ids(index, key, pattern);
                candidates
                    .into_par_iter()
                    .filter(|id| matching.contains(id))
                    .collect()
            }
            TagExpr::Match { key, .. } => keep_absent(candidates, key, series_by_id),
            // Absent key and differing value both survive a negative clause.
            TagExpr::NotEqual { key, value } => {
                let ids = index.ids(key, value);
                candidates
                    .into_par_iter()
                    .filter(|id| ids.map_or(true, |ids| !ids.contains(id)))
                    .collect()
            }
            TagExpr::NotMatch { key, pattern } => {
                let matching = matching_ids(index, key, pattern);
                candidates
                    .into_par_iter()
                    .filter(|id| !matching.contains(id))
                    .collect()
            }
        }
    }
}

/// Union of the ID sets under every value of `key` matching `pattern`.
fn matching_ids(index: &TagIndex, key: &str, pattern: &Pattern) -> HashSet<SeriesId> {
    let mut out = HashSet::new();
    if let Some(values) = index.values(key) {
        for (value, ids) in values {
            if pattern.matches(value) {
                out.extend(ids.iter().cloned());
            }
        }
    }
    out
}

/// Keeps only candidates whose metadata record holds no tag with `key`.
/// A candidate whose record is gone (a delete racing this query) is dropped
/// rather than guessed at.
fn keep_absent(
    candidates: HashSet<SeriesId>,
    key: &str,
    series_by_id: &HashMap<SeriesId, SeriesMeta>,
) -> HashSet<SeriesId> {
    candidates
        .into_par_iter()
        .filter(|id| {
            series_by_id
                .get(id)
                .map_or(false, |meta| !meta.has_tag_key(key))
        })
        .collect()
}

/// A validated, compiled tag query: an ordered clause list, at least one of
/// which positively asserts a non-empty value.
#[derive(Debug, Clone)]
pub struct TagQuery {
    exprs: Vec<TagExpr>,
}

impl TagQuery {
    /// Compiles a list of raw expressions into a query plan.
    ///
    /// Fails with [`IdxError::InvalidQuery`] when any clause is malformed,
    /// a pattern does not compile, or no clause is seed-eligible (queries
    /// built only from negative/absence constraints cannot be evaluated
    /// without a full index scan and are rejected by design).
    pub fn new<S: AsRef<str>>(expressions: &[S]) -> Result<Self, IdxError> {
        let mut exprs = Vec::with_capacity(expressions.len());
        for raw in expressions {
            if let Some(expr) = TagExpr::parse(raw.as_ref())? {
                exprs.push(expr);
            }
        }
        if !exprs.iter().any(TagExpr::is_seed) {
            return Err(IdxError::InvalidQuery);
        }
        Ok(TagQuery { exprs })
    }

    /// The compiled clauses, in declaration order (no-op clauses pruned).
    pub fn expressions(&self) -> &[TagExpr] {
        &self.exprs
    }

    /// Picks the seed clause: the seed-eligible clause with the smallest
    /// candidate set, ties resolving to the first-declared clause.
    fn select_seed(&self, index: &TagIndex) -> Option<(usize, HashSet<SeriesId>)> {
        let mut best: Option<(usize, HashSet<SeriesId>)> = None;
        for (i, expr) in self.exprs.iter().enumerate() {
            if !expr.is_seed() {
                continue;
            }
            let candidates = expr.seed_candidates(index);
            match &best {
                Some((_, current)) if current.len() <= candidates.len() => {}
                _ => best = Some((i, candidates)),
            }
        }
        best
    }

    /// Evaluates the query against a tag index and the metadata records
    /// backing it, returning the set of matching series IDs. The result is
    /// owned and insulated from subsequent index mutation.
    pub fn run(
        &self,
        index: &TagIndex,
        series_by_id: &HashMap<SeriesId, SeriesMeta>,
    ) -> Result<HashSet<SeriesId>, IdxError> {
        // Unreachable for queries built through `new`, which guarantees a
        // seed clause exists.
        let (seed, mut result) = self.select_seed(index).ok_or(IdxError::InvalidQuery)?;
        if result.is_empty() {
            return Ok(result);
        }
        for (i, expr) in self.exprs.iter().enumerate() {
            if i == seed {
                continue;
            }
            result = expr.filter(result, index, series_by_id);
            if result.is_empty() {
                break;
            }
        }
        Ok(result)
    }
}
