//! Reclamation of idle leases
//!
//! Systems that crash or forget to release keep their accounts leased. The
//! reaper periodically frees every lease that has not been touched for
//! longer than the release timeout.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use leasepool_core::{AccountFilter, Clock, HolderFilter};
use leasepool_storage::{AccountStore, AccountWrite, StorageError};

use crate::transitions::{AUTO_RELEASE_REASON, diff};

/// Release every lease idle for at least `release_timeout`
///
/// Returns the number of accounts released.
pub fn reap_idle(
    store: &dyn AccountStore,
    clock: &dyn Clock,
    release_timeout: Duration,
) -> Result<usize, StorageError> {
    let now = clock.now_utc();
    let Some(cutoff) = TimeDelta::from_std(release_timeout)
        .ok()
        .and_then(|timeout| now.checked_sub_signed(timeout))
    else {
        return Ok(0);
    };

    let filter = AccountFilter::all()
        .holder(HolderFilter::Leased)
        .modified_at_or_before(cutoff);
    let idle = store.scan(&filter, None)?;
    if idle.is_empty() {
        return Ok(0);
    }

    info!(count = idle.len(), "Releasing idle accounts");

    let mut released = 0;
    for account in idle {
        let written = store.transact(&account.username, &mut |current| {
            let prev = current?;
            // Touched since the scan
            if !filter.matches(&prev) {
                return None;
            }

            let mut next = prev.clone();
            next.system_id = None;
            next.last_modified = now;
            let events = diff(&prev, &next, Some(AUTO_RELEASE_REASON), now);
            Some(AccountWrite::new(next).with_events(events))
        })?;

        if written.is_some() {
            released += 1;
        } else {
            debug!(username = %account.username, "Account active again, not released");
        }
    }

    Ok(released)
}

/// Background reaper task
pub struct Reaper {
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    release_timeout: Duration,
    interval: Duration,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Reaper {
    /// Spawn the reaper as a background task
    pub fn spawn(
        store: Arc<dyn AccountStore>,
        clock: Arc<dyn Clock>,
        release_timeout: Duration,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let reaper = Self {
            store,
            clock,
            release_timeout,
            interval,
            shutdown_rx,
        };

        tokio::spawn(async move {
            reaper.run().await;
        })
    }

    async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            timeout_mins = self.release_timeout.as_secs() / 60,
            "Reaper started"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Reaper shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let store = Arc::clone(&self.store);
                    let clock = Arc::clone(&self.clock);
                    let timeout = self.release_timeout;
                    let cycle = tokio::task::spawn_blocking(move || {
                        reap_idle(store.as_ref(), clock.as_ref(), timeout)
                    });
                    match cycle.await {
                        Ok(Ok(0)) => {}
                        Ok(Ok(released)) => info!(released, "Released idle accounts"),
                        Ok(Err(e)) => error!(error = %e, "Reaper cycle failed"),
                        Err(e) => error!(error = %e, "Reaper cycle panicked"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leasepool_core::{Account, ManualClock};
    use leasepool_storage::InMemoryAccountStore;

    const TIMEOUT: Duration = Duration::from_secs(120 * 60);

    #[test]
    fn test_releases_only_idle_leases() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let store = InMemoryAccountStore::new();
        store
            .insert_if_absent(Account::new("idle", start).with_system_id("sysA"))
            .unwrap();
        store
            .insert_if_absent(Account::new("busy", start + TimeDelta::minutes(30)).with_system_id("sysB"))
            .unwrap();
        store.insert_if_absent(Account::new("free", start)).unwrap();

        clock.advance(TimeDelta::minutes(120));
        assert_eq!(reap_idle(&store, &clock, TIMEOUT).unwrap(), 1);

        let idle = store.get("idle").unwrap().unwrap();
        assert!(!idle.is_leased());
        assert_eq!(idle.last_modified, clock.now_utc());
        assert!(store.get("busy").unwrap().unwrap().is_leased());

        let events = store.events_for("idle").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event.description,
            "Got released from [sysA]: auto-release, idle timeout"
        );
        assert!(store.events_for("free").unwrap().is_empty());
    }

    #[test]
    fn test_nothing_to_reap() {
        let clock = ManualClock::default();
        let store = InMemoryAccountStore::new();
        assert_eq!(reap_idle(&store, &clock, TIMEOUT).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reaper_stops_on_shutdown() {
        let (shutdown_tx, _) = broadcast::channel(1);
        let task = Reaper::spawn(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(ManualClock::default()),
            TIMEOUT,
            Duration::from_secs(3600),
            shutdown_tx.subscribe(),
        );
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
