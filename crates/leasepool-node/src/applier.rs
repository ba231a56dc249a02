//! Background update applier
//!
//! A single task drains the update queue in submission order:
//! - Converts each patch into typed changes (invalid patches are dropped)
//! - Merges the changes into the stored account and logs the transitions
//! - Retries transient storage failures with capped exponential backoff
//!
//! On shutdown the queue is closed and every patch already accepted is
//! still applied before the task exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use leasepool_core::{Account, AccountChanges, Clock, UpdatePatch};
use leasepool_storage::{AccountStore, AccountWrite, StorageError};

use crate::config::RetryPolicy;
use crate::transitions::diff;

/// Counters maintained by the applier
#[derive(Debug, Default)]
pub struct ApplierMetrics {
    applied: AtomicU64,
    dropped_invalid: AtomicU64,
    dropped_exhausted: AtomicU64,
    retries: AtomicU64,
}

impl ApplierMetrics {
    pub fn snapshot(&self) -> ApplierStats {
        ApplierStats {
            applied: self.applied.load(Ordering::Relaxed),
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            dropped_exhausted: self.dropped_exhausted.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ApplierMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplierStats {
    /// Patches committed to the store
    pub applied: u64,
    /// Patches dropped without a retry
    pub dropped_invalid: u64,
    /// Patches dropped after running out of retries
    pub dropped_exhausted: u64,
    /// Failed attempts that were retried
    pub retries: u64,
}

/// Background update applier
pub struct Applier {
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    updates: mpsc::Receiver<UpdatePatch>,
    shutdown_rx: broadcast::Receiver<()>,
    metrics: Arc<ApplierMetrics>,
}

impl Applier {
    /// Spawn the applier as a background task
    pub fn spawn(
        store: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        updates: mpsc::Receiver<UpdatePatch>,
        shutdown_rx: broadcast::Receiver<()>,
        metrics: Arc<ApplierMetrics>,
    ) -> JoinHandle<()> {
        let applier = Self {
            store,
            clock,
            retry,
            updates,
            shutdown_rx,
            metrics,
        };

        tokio::spawn(async move {
            applier.run().await;
        })
    }

    async fn run(mut self) {
        info!(max_attempts = self.retry.max_attempts, "Update applier started");

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Update applier shutting down");
                    break;
                }
                patch = self.updates.recv() => match patch {
                    Some(patch) => self.process(patch).await,
                    None => break,
                },
            }
        }

        // Refuse new submissions, then finish what was already accepted
        self.updates.close();
        let mut drained = 0usize;
        while let Some(patch) = self.updates.recv().await {
            self.process(patch).await;
            drained += 1;
        }

        info!(drained, "Update applier stopped");
    }

    async fn process(&self, patch: UpdatePatch) {
        let changes = match patch.changes() {
            Ok(changes) => changes,
            Err(e) => {
                self.metrics.dropped_invalid.fetch_add(1, Ordering::Relaxed);
                error!(
                    username = patch.username(),
                    error = %e,
                    payload = %patch.to_value(),
                    "Dropping invalid account update"
                );
                return;
            }
        };

        let patch = Arc::new(patch);
        let changes = Arc::new(changes);
        let mut failures = 0u32;
        loop {
            let attempt = {
                let store = Arc::clone(&self.store);
                let clock = Arc::clone(&self.clock);
                let (patch, changes) = (Arc::clone(&patch), Arc::clone(&changes));
                tokio::task::spawn_blocking(move || {
                    apply_patch(store.as_ref(), clock.as_ref(), &patch, &changes)
                })
                .await
            };
            let result = match attempt {
                Ok(result) => result,
                Err(e) => {
                    self.metrics.dropped_invalid.fetch_add(1, Ordering::Relaxed);
                    error!(
                        username = patch.username(),
                        error = %e,
                        payload = %patch.to_value(),
                        "Account update task failed"
                    );
                    return;
                }
            };

            match result {
                Ok(events) => {
                    self.metrics.applied.fetch_add(1, Ordering::Relaxed);
                    debug!(username = patch.username(), events, "Applied account update");
                    return;
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures >= self.retry.max_attempts {
                        self.metrics.dropped_exhausted.fetch_add(1, Ordering::Relaxed);
                        error!(
                            username = patch.username(),
                            attempts = failures,
                            error = %e,
                            payload = %patch.to_value(),
                            "Giving up on account update"
                        );
                        return;
                    }

                    self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                    let delay = self.retry.backoff(failures);
                    if failures > self.retry.warn_after {
                        warn!(
                            username = patch.username(),
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Account update keeps failing, retrying"
                        );
                    } else {
                        debug!(
                            username = patch.username(),
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Account update failed, retrying"
                        );
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.metrics.dropped_invalid.fetch_add(1, Ordering::Relaxed);
                    error!(
                        username = patch.username(),
                        error = %e,
                        payload = %patch.to_value(),
                        "Dropping account update after storage error"
                    );
                    return;
                }
            }
        }
    }

}

/// Merge one patch into its account; returns the number of events logged
fn apply_patch(
    store: &dyn AccountStore,
    clock: &dyn Clock,
    patch: &UpdatePatch,
    changes: &AccountChanges,
) -> Result<usize, StorageError> {
    let now = clock.now_utc();
    let username = patch.username();
    let reason = patch.reason();
    let mut emitted = 0;

    store.transact(username, &mut |current| {
        let prev = current.unwrap_or_else(|| Account::new(username, now));
        let mut next = prev.clone();
        changes.apply_to(&mut next);
        next.last_modified = now;

        let events = diff(&prev, &next, reason, now);
        emitted = events.len();
        Some(AccountWrite::new(next).with_events(events))
    })?;

    Ok(emitted)
}
