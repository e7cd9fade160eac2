//! Background Scheduler.
//!
//! Two independent periodic `tokio::spawn` loops — decay+prune and
//! consolidation — each with its own startup delay and interval, sharing
//! one cooperative `Cancellation` handle for shutdown. Each loop sleeps
//! out its initial delay, then runs on a fixed interval, logging success,
//! failure, and busy-skip via `tracing`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::MaintenanceConfig;
use crate::maintenance::{self, Cancellation, MaintenanceLock, Operation};
use crate::storage::Storage;

/// Owns the two background maintenance loops. Dropping the handle does not
/// stop the loops; call `shutdown().await` explicitly.
pub struct Scheduler {
    cancellation: Cancellation,
    decay_handle: Option<JoinHandle<()>>,
    consolidation_handle: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl Scheduler {
    /// Spawn the decay and consolidation loops per `config`. Disabled loops
    /// (`config.enabled == false` or the per-loop flag) are simply not
    /// spawned.
    pub fn start(
        store: Arc<Storage>,
        lock: Arc<MaintenanceLock>,
        config: &MaintenanceConfig,
    ) -> Self {
        let cancellation = Cancellation::new();
        let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_seconds);

        let decay_handle = if config.enabled && config.decay_enabled {
            Some(spawn_decay_loop(
                store.clone(),
                lock.clone(),
                config.clone(),
                cancellation.clone(),
            ))
        } else {
            None
        };

        let consolidation_handle = if config.enabled && config.consolidation_enabled {
            Some(spawn_consolidation_loop(
                store,
                lock,
                config.clone(),
                cancellation.clone(),
            ))
        } else {
            None
        };

        Self {
            cancellation,
            decay_handle,
            consolidation_handle,
            shutdown_timeout,
        }
    }

    /// Signal cancellation and await both loops within the configured
    /// shutdown timeout. Loops that don't exit in time are aborted.
    pub async fn shutdown(mut self) {
        self.cancellation.cancel();

        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;

        if let Some(handle) = self.decay_handle.take() {
            await_with_deadline(handle, deadline, "decay").await;
        }
        if let Some(handle) = self.consolidation_handle.take() {
            await_with_deadline(handle, deadline, "consolidation").await;
        }
    }
}

async fn await_with_deadline(handle: JoinHandle<()>, deadline: tokio::time::Instant, name: &str) {
    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
    if tokio::time::timeout(remaining, handle).await.is_err() {
        warn!(loop_name = name, "maintenance loop did not stop within shutdown timeout, abandoning");
    }
}

fn spawn_decay_loop(
    store: Arc<Storage>,
    lock: Arc<MaintenanceLock>,
    config: MaintenanceConfig,
    cancellation: Cancellation,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(config.initial_delay_minutes * 60)).await;

        loop {
            if cancellation.is_cancelled() {
                break;
            }

            match lock.try_acquire(Operation::DecayPrune) {
                Ok(_guard) => {
                    match maintenance::run_decay_prune(
                        &store,
                        config.prune_threshold as f64,
                        &cancellation,
                    ) {
                        Ok(result) if result.success => info!(
                            processed = result.processed,
                            pruned = result.pruned,
                            avg_strength_before = result.avg_strength_before,
                            avg_strength_after = result.avg_strength_after,
                            duration_ms = result.duration_ms,
                            "decay+prune run complete"
                        ),
                        Ok(result) => warn!(
                            processed = result.processed,
                            pruned = result.pruned,
                            error_message = result.error_message.as_deref().unwrap_or(""),
                            "decay+prune run did not complete"
                        ),
                        Err(err) => warn!(error = %err, "decay+prune run failed"),
                    }
                }
                Err(err) => info!(error = %err, "skipping decay+prune run, maintenance busy"),
            }

            tokio::time::sleep(Duration::from_secs(config.decay_interval_hours * 3600)).await;
        }
    })
}

fn spawn_consolidation_loop(
    store: Arc<Storage>,
    lock: Arc<MaintenanceLock>,
    config: MaintenanceConfig,
    cancellation: Cancellation,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Offset from the decay loop's startup delay so the two runs don't
        // contend for the maintenance mutex on first boot.
        let initial_delay = config.initial_delay_minutes * 60 + 5 * 60;
        tokio::time::sleep(Duration::from_secs(initial_delay)).await;

        loop {
            if cancellation.is_cancelled() {
                break;
            }

            match lock.try_acquire(Operation::Consolidation) {
                Ok(_guard) => {
                    match maintenance::run_consolidation(
                        &store,
                        config.similarity_threshold,
                        &cancellation,
                    ) {
                        Ok(result) if result.success => info!(
                            analyzed = result.analyzed,
                            clusters_found = result.clusters_found,
                            merged = result.merged,
                            archived = result.archived,
                            duration_ms = result.duration_ms,
                            "consolidation run complete"
                        ),
                        Ok(result) => warn!(
                            analyzed = result.analyzed,
                            merged = result.merged,
                            archived = result.archived,
                            error_message = result.error_message.as_deref().unwrap_or(""),
                            "consolidation run did not complete"
                        ),
                        Err(err) => warn!(error = %err, "consolidation run failed"),
                    }
                }
                Err(err) => info!(error = %err, "skipping consolidation run, maintenance busy"),
            }

            tokio::time::sleep(Duration::from_secs(config.consolidation_interval_hours * 3600))
                .await;
        }
    })
}
