//! Consolidation run.
//!
//! Greedy single-pass clustering over current, non-expired records: walk
//! the set in stored order, group each unclustered record with every
//! later record whose similarity crosses `threshold`, then within each
//! cluster of size >= 2 keep the strongest record (reinforced) and archive
//! the rest, linking them to the survivor via `superseded_by`/
//! `superseded_ids` the same way the Conflict Resolver does.

use chrono::Utc;
use uuid::Uuid;

use super::cancellation::Cancellation;
use crate::error::MaintenanceResult;
use crate::record::MemoryRecord;
use crate::storage::Storage;
use crate::trigram;
use crate::vector;

/// Result of one consolidation run. Never thrown across the public
/// boundary: a failed or cancelled run still reports whatever counts it
/// accumulated, with `success = false` and `error_message` set.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationResult {
    pub analyzed: u64,
    pub clusters_found: u64,
    pub merged: u64,
    pub archived: u64,
    pub duration_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Similarity used for clustering: `0.6*cosine + 0.4*trigram_jaccard` when
/// both records carry an embedding, else trigram Jaccard alone.
fn similarity(a: &MemoryRecord, b: &MemoryRecord) -> f32 {
    let fuzzy = trigram::jaccard(&a.trigrams, &b.trigrams);
    match (&a.embedding, &b.embedding) {
        (Some(ea), Some(eb)) => 0.6 * vector::cosine_similarity(ea, eb) + 0.4 * fuzzy,
        _ => fuzzy,
    }
}

/// Run one consolidation pass over all current, non-expired records.
pub fn run_consolidation(
    store: &Storage,
    threshold: f32,
    cancellation: &Cancellation,
) -> MaintenanceResult<ConsolidationResult> {
    let start = std::time::Instant::now();
    let now = Utc::now();

    let records: Vec<MemoryRecord> = store
        .enumerate()?
        .into_iter()
        .filter(|r| r.is_current() && !r.is_expired_at(now))
        .collect();
    let analyzed = records.len() as u64;

    let mut clustered = vec![false; records.len()];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..records.len() {
        if cancellation.is_cancelled() {
            return Ok(ConsolidationResult {
                analyzed,
                clusters_found: clusters.len() as u64,
                merged: 0,
                archived: 0,
                duration_ms: start.elapsed().as_millis() as u64,
                success: false,
                error_message: Some(crate::error::MaintenanceError::Cancelled.to_string()),
            });
        }
        if clustered[i] {
            continue;
        }
        let mut cluster = vec![i];
        for j in (i + 1)..records.len() {
            if clustered[j] {
                continue;
            }
            if similarity(&records[i], &records[j]) >= threshold {
                cluster.push(j);
            }
        }
        if cluster.len() >= 2 {
            for &idx in &cluster {
                clustered[idx] = true;
            }
            clusters.push(cluster);
        }
    }

    let clusters_found = clusters.len() as u64;
    let mut merged = 0u64;
    let mut archived = 0u64;

    for cluster in clusters {
        if cancellation.is_cancelled() {
            return Ok(ConsolidationResult {
                analyzed,
                clusters_found,
                merged,
                archived,
                duration_ms: start.elapsed().as_millis() as u64,
                success: false,
                error_message: Some(crate::error::MaintenanceError::Cancelled.to_string()),
            });
        }

        let mut members: Vec<Uuid> = cluster.iter().map(|&idx| records[idx].id).collect();
        members.sort_by(|a, b| {
            let ra = records.iter().find(|r| r.id == *a).unwrap();
            let rb = records.iter().find(|r| r.id == *b).unwrap();
            rb.current_strength_at(now)
                .partial_cmp(&ra.current_strength_at(now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let Some((survivor_id, rest)) = members.split_first() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        let Some(mut survivor) = store.get(*survivor_id)? else {
            continue;
        };
        if !survivor.is_current() {
            continue;
        }
        survivor.reinforce_at(now);

        for archived_id in rest {
            let Some(mut member) = store.get(*archived_id)? else {
                continue;
            };
            if !member.is_current() {
                continue;
            }
            member.is_archived = true;
            member.valid_until = Some(now);
            member.superseded_by = Some(survivor.id);
            store.save(&member)?;
            survivor.superseded_ids.push(member.id);
            archived += 1;
        }

        store.save(&survivor)?;
        merged += 1;
    }

    Ok(ConsolidationResult {
        analyzed,
        clusters_found,
        merged,
        archived,
        duration_ms: start.elapsed().as_millis() as u64,
        success: true,
        error_message: None,
    })
}
