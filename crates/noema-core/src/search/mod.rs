//! Hybrid Search Engine.
//!
//! Scores every current, non-expired candidate on four signals
//! (semantic, fuzzy, strength, recency), combines them with fixed weights,
//! and returns a deduplicated, deterministically-ordered top-N.

use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::error::{SearchError, SearchResult};
use crate::record::MemoryRecord;
use crate::storage::Storage;
use crate::trigram;
use crate::vector;

/// Per-signal sub-scores and the resulting composite for one candidate.
///
/// `semantic_score` is exposed separately from `composite_score` so the
/// conflict resolver can threshold on the semantic sub-score specifically,
/// rather than on the blended composite.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub semantic_score: f32,
    pub fuzzy_score: f32,
    pub strength_score: f32,
    pub recency_score: f32,
    pub composite_score: f32,
}

/// Fixed composite weights, not exposed via configuration.
mod weights {
    pub const SEMANTIC: f32 = 0.6;
    pub const FUZZY_WITH_SEMANTIC: f32 = 0.2;
    pub const STRENGTH_WITH_SEMANTIC: f32 = 0.1;
    pub const RECENCY_WITH_SEMANTIC: f32 = 0.1;

    pub const FUZZY_NO_SEMANTIC: f32 = 0.7;
    pub const STRENGTH_NO_SEMANTIC: f32 = 0.15;
    pub const RECENCY_NO_SEMANTIC: f32 = 0.15;
}

/// Optional filters on top of `query`/`top_n`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub top_n: usize,
    pub tag_filter: Option<HashSet<String>>,
}

impl SearchOptions {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            tag_filter: None,
        }
    }

    pub fn with_tag_filter(mut self, tags: HashSet<String>) -> Self {
        self.tag_filter = Some(tags);
        self
    }
}

/// Score and rank current records against `query`.
///
/// `embedder` is consulted once to embed the query; if it is unavailable
/// or embedding fails, search falls back to lexical-only scoring and
/// still returns results rather than propagating the error.
pub fn search(
    store: &Storage,
    embedder: &dyn EmbeddingProvider,
    query: &str,
    options: &SearchOptions,
) -> SearchResult<Vec<ScoredRecord>> {
    if options.top_n == 0 || options.top_n > 100 {
        return Err(SearchError::InvalidArgument(
            "top_n must be in [1, 100]".to_string(),
        ));
    }

    let query_embedding = if embedder.is_available() {
        match embedder.embed(query) {
            Ok(mut v) => {
                vector::normalize(&mut v);
                Some(v)
            }
            Err(err) => {
                tracing::warn!(error = %err, "embedding failed during search, falling back to lexical scoring");
                None
            }
        }
    } else {
        None
    };

    let query_trigrams = trigram::trigrams(query);
    let now = Utc::now();

    let candidates = store.enumerate()?;
    let mut scored: Vec<ScoredRecord> = Vec::new();

    for record in candidates {
        if !record.is_current() || record.is_expired_at(now) {
            continue;
        }
        if let Some(tags) = &options.tag_filter {
            let has_match = tags.iter().any(|t| record.has_tag(t));
            if !has_match {
                continue;
            }
        }

        let semantic_score = match (&query_embedding, &record.embedding) {
            (Some(q), Some(e)) => vector::cosine_similarity(q, e),
            _ => 0.0,
        };
        let fuzzy_score = trigram::jaccard(&query_trigrams, &record.trigrams);
        let strength_score = record.current_strength_at(now).clamp(0.0, 1.0) as f32;
        let days_since_access = (now - record.last_accessed_at).num_milliseconds() as f32
            / (1000.0 * 60.0 * 60.0 * 24.0);
        let recency_score = (-days_since_access.max(0.0) / 30.0).exp();

        let composite_score = if query_embedding.is_some() {
            weights::SEMANTIC * semantic_score
                + weights::FUZZY_WITH_SEMANTIC * fuzzy_score
                + weights::STRENGTH_WITH_SEMANTIC * strength_score
                + weights::RECENCY_WITH_SEMANTIC * recency_score
        } else {
            weights::FUZZY_NO_SEMANTIC * fuzzy_score
                + weights::STRENGTH_NO_SEMANTIC * strength_score
                + weights::RECENCY_NO_SEMANTIC * recency_score
        };

        if composite_score <= 0.0 {
            continue;
        }

        scored.push(ScoredRecord {
            record,
            semantic_score,
            fuzzy_score,
            strength_score,
            recency_score,
            composite_score,
        });
    }

    scored.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.record.last_accessed_at.cmp(&a.record.last_accessed_at))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });

    let mut seen: HashSet<Uuid> = HashSet::new();
    scored.retain(|s| seen.insert(s.record.id));
    scored.truncate(options.top_n);

    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::NoopEmbeddingProvider;
    use tempfile::tempdir;

    fn temp_store() -> (Storage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        (Storage::new(Some(path)).unwrap(), dir)
    }

    #[test]
    fn search_respects_top_n_bounds() {
        let (store, _dir) = temp_store();
        let embedder = NoopEmbeddingProvider::new(384);
        let err = search(&store, &embedder, "q", &SearchOptions::new(0)).unwrap_err();
        assert!(matches!(err, SearchError::InvalidArgument(_)));
        let err = search(&store, &embedder, "q", &SearchOptions::new(101)).unwrap_err();
        assert!(matches!(err, SearchError::InvalidArgument(_)));
    }

    #[test]
    fn search_dedupes_by_id_under_multi_field_overlap() {
        let (store, _dir) = temp_store();
        let embedder = NoopEmbeddingProvider::new(384);

        let mut record = MemoryRecord::default();
        record.title = "hexvera".to_string();
        record.summary = "hexvera system".to_string();
        record.content = "hexvera hexvera hexvera".to_string();
        record.tags = vec!["hexvera".to_string()];
        record.recompute_derived_text();
        store.save(&record).unwrap();

        let results = search(&store, &embedder, "hexvera", &SearchOptions::new(10)).unwrap();
        let matching: Vec<_> = results.iter().filter(|r| r.record.id == record.id).collect();
        assert_eq!(matching.len(), 1);
    }

    #[test]
    fn search_filters_archived_and_expired() {
        let (store, _dir) = temp_store();
        let embedder = NoopEmbeddingProvider::new(384);

        let mut archived = MemoryRecord::default();
        archived.title = "findme".to_string();
        archived.is_archived = true;
        archived.valid_until = Some(Utc::now());
        archived.recompute_derived_text();
        store.save(&archived).unwrap();

        let results = search(&store, &embedder, "findme", &SearchOptions::new(10)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn search_respects_tag_filter() {
        let (store, _dir) = temp_store();
        let embedder = NoopEmbeddingProvider::new(384);

        let mut tagged = MemoryRecord::default();
        tagged.title = "shared token alpha".to_string();
        tagged.tags = vec!["keepme".to_string()];
        tagged.recompute_derived_text();
        store.save(&tagged).unwrap();

        let mut untagged = MemoryRecord::default();
        untagged.title = "shared token alpha".to_string();
        untagged.recompute_derived_text();
        store.save(&untagged).unwrap();

        let mut filter = HashSet::new();
        filter.insert("keepme".to_string());
        let options = SearchOptions::new(10).with_tag_filter(filter);
        let results = search(&store, &embedder, "shared token alpha", &options).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, tagged.id);
    }

    #[test]
    fn search_without_embedder_uses_lexical_weights_only() {
        let (store, _dir) = temp_store();
        let embedder = NoopEmbeddingProvider::new(384);

        let mut record = MemoryRecord::default();
        record.title = "lexical only query text".to_string();
        record.recompute_derived_text();
        store.save(&record).unwrap();

        let results = search(
            &store,
            &embedder,
            "lexical only query text",
            &SearchOptions::new(5),
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].semantic_score, 0.0);
    }
}
