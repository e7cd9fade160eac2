//! Decay + prune run.
//!
//! `current_strength` is never persisted as a stale snapshot;
//! this run only *prunes* records whose computed strength has fallen below
//! `threshold`, via `Storage::prune_weak`. The before/after averages are
//! what make the run's effect observable without writing the decayed value
//! back to every row.

use super::cancellation::Cancellation;
use crate::error::MaintenanceResult;
use crate::storage::Storage;

/// Result of one decay+prune run. Never thrown across the public
/// boundary: a failed or cancelled run still reports whatever counts it
/// accumulated, with `success = false` and `error_message` set.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayResult {
    pub processed: u64,
    pub pruned: u64,
    pub avg_strength_before: f64,
    pub avg_strength_after: f64,
    pub duration_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Run one decay+prune pass: snapshot average strength, prune everything
/// below `threshold`, snapshot again.
///
/// Honors `cancellation` by checking it before the (non-interruptible,
/// single-statement) prune; there is no per-record loop to check between,
/// since `prune_weak` is one SQL statement against the store. On
/// cancellation this returns `Ok` with a partial result marked
/// unsuccessful, rather than discarding the before-snapshot via `Err`.
pub fn run_decay_prune(
    store: &Storage,
    threshold: f64,
    cancellation: &Cancellation,
) -> MaintenanceResult<DecayResult> {
    let start = std::time::Instant::now();

    if cancellation.is_cancelled() {
        return Ok(DecayResult {
            processed: 0,
            pruned: 0,
            avg_strength_before: 0.0,
            avg_strength_after: 0.0,
            duration_ms: start.elapsed().as_millis() as u64,
            success: false,
            error_message: Some(crate::error::MaintenanceError::Cancelled.to_string()),
        });
    }

    let before = store.stats()?;
    let pruned = store.prune_weak(threshold)? as u64;
    let after = store.stats()?;

    Ok(DecayResult {
        processed: before.total,
        pruned,
        avg_strength_before: before.avg_strength,
        avg_strength_after: after.avg_strength,
        duration_ms: start.elapsed().as_millis() as u64,
        success: true,
        error_message: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryRecord;
    use tempfile::tempdir;

    fn temp_store() -> (Storage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        (Storage::new(Some(path)).unwrap(), dir)
    }

    #[test]
    fn prunes_weak_records_and_reports_counts() {
        let (store, _dir) = temp_store();

        let mut strong = MemoryRecord::default();
        strong.base_strength = 1.0;
        strong.is_pinned = true;
        store.save(&strong).unwrap();

        let mut weak = MemoryRecord::default();
        weak.base_strength = 0.001;
        weak.importance = 0.0;
        weak.decay_rate = 5.0;
        weak.last_accessed_at = chrono::Utc::now() - chrono::Duration::days(30);
        store.save(&weak).unwrap();

        let cancellation = Cancellation::new();
        let result = run_decay_prune(&store, 0.1, &cancellation).unwrap();

        assert_eq!(result.processed, 2);
        assert_eq!(result.pruned, 1);
        assert!(result.success);
        assert!(result.error_message.is_none());
        assert_eq!(store.enumerate().unwrap().len(), 1);
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let (store, _dir) = temp_store();
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let result = run_decay_prune(&store, 0.1, &cancellation).unwrap();
        assert!(!result.success);
        assert!(result.error_message.is_some());
        assert_eq!(result.processed, 0);
        assert_eq!(result.pruned, 0);
    }
}
