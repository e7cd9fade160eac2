//! Conflict Resolver — the write path.
//!
//! Classifies an inbound record against the current set using the
//! semantic sub-score from a search, then reinforces, supersedes, lets it
//! coexist, or inserts it fresh. Each branch reloads its target record
//! immediately before mutating it, so a concurrent writer can't be
//! silently clobbered by a stale in-memory copy.

use chrono::Utc;
use uuid::Uuid;

use crate::config::ConflictConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::ConflictResult;
use crate::record::MemoryRecord;
use crate::search::{self, SearchOptions};
use crate::storage::Storage;

/// Outcome of resolving a new record against current memory.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ConflictOutcome {
    /// `new` was not inserted; the existing record `S` was reinforced
    /// (and possibly had its content replaced).
    ReinforcedExisting(MemoryRecord),
    /// `new` was inserted after archiving and linking the records it
    /// supersedes.
    StoredWithSupersede {
        new: MemoryRecord,
        superseded: Vec<MemoryRecord>,
    },
    /// `new` was inserted alongside a similar-but-distinct record.
    StoredCoexist {
        new: MemoryRecord,
        nearest: MemoryRecord,
    },
    /// `new` was inserted with no meaningful overlap to existing records.
    StoredNew(MemoryRecord),
}

/// Classify and store `new` against the current record set.
///
/// `new` must already have its text fields, tags, and derived
/// `content_normalized`/`trigrams` populated (e.g. via
/// `MemoryRecord::from_request`). If `new.embedding` is absent and the
/// embedder is available, it is computed here from
/// `title + " " + summary + " " + content` before classification.
pub fn classify_and_store(
    store: &Storage,
    embedder: &dyn EmbeddingProvider,
    mut new: MemoryRecord,
    config: &ConflictConfig,
) -> ConflictResult<ConflictOutcome> {
    if new.embedding.is_none() && embedder.is_available() {
        let text = format!("{} {} {}", new.title, new.summary, new.content);
        match embedder.embed(&text) {
            Ok(mut v) => {
                crate::vector::normalize(&mut v);
                new.embedding = Some(v);
            }
            Err(err) => {
                tracing::warn!(error = %err, "embedding unavailable while classifying new memory, continuing lexically");
            }
        }
    }

    let query = format!("{} {}", new.title, new.summary);
    let options = SearchOptions::new(10);
    let candidates = search::search(store, embedder, &query, &options)?;

    let Some(top) = candidates.first() else {
        return Ok(store_fresh(store, new)?);
    };

    let s = top.semantic_score;

    if s >= config.duplicate_threshold {
        return Ok(reinforce_existing(store, top.record.id, &new)?);
    }

    if s >= config.supersede_threshold {
        let supersede_candidates: Vec<Uuid> = candidates
            .iter()
            .filter(|c| {
                c.semantic_score >= config.supersede_threshold
                    && c.semantic_score < config.duplicate_threshold
                    && c.record.is_current()
                    && c.record.id != new.id
            })
            .map(|c| c.record.id)
            .collect();

        let mut superseded = Vec::new();
        let now = Utc::now();
        for candidate_id in supersede_candidates {
            let Some(mut candidate) = store.get(candidate_id)? else {
                continue;
            };
            if !candidate.is_current() {
                continue;
            }
            candidate.valid_until = Some(now);
            candidate.superseded_by = Some(new.id);
            candidate.is_archived = true;
            store.save(&candidate)?;
            new.superseded_ids.push(candidate.id);
            superseded.push(candidate);
        }

        if !superseded.is_empty() {
            new.valid_from = now;
            store.save(&new)?;
            return Ok(ConflictOutcome::StoredWithSupersede { new, superseded });
        }
        // Fell through: the reload check found nothing left to supersede.
    }

    if s >= config.coexist_threshold {
        new.valid_from = Utc::now();
        store.save(&new)?;
        return Ok(ConflictOutcome::StoredCoexist {
            new,
            nearest: top.record.clone(),
        });
    }

    Ok(store_fresh(store, new)?)
}

fn store_fresh(store: &Storage, mut new: MemoryRecord) -> crate::error::StoreResult<ConflictOutcome> {
    new.valid_from = Utc::now();
    store.save(&new)?;
    Ok(ConflictOutcome::StoredNew(new))
}

fn reinforce_existing(
    store: &Storage,
    existing_id: Uuid,
    new: &MemoryRecord,
) -> crate::error::StoreResult<ConflictOutcome> {
    let mut existing = store.reinforce(existing_id)?;
    if !new.content.is_empty() && new.content.len() > existing.content.len() {
        existing.content = new.content.clone();
        existing.recompute_derived_text();
        store.save(&existing)?;
    }
    Ok(ConflictOutcome::ReinforcedExisting(existing))
}
