//! # LeasePool Node
//!
//! Pool coordinator for LeasePool.
//!
//! This crate provides [`LeasePool`], which ties together:
//! - Lease allocation (synchronous, under a bounded-wait lock)
//! - Write-behind account updates (bounded queue + single applier task)
//! - Reclamation of idle leases (periodic reaper task)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use leasepool_core::LeaseRequest;
//! use leasepool_node::{LeasePool, PoolConfig};
//! use leasepool_storage::{RedbAccountStore, RedbStoreConfig};
//!
//! let store = RedbAccountStore::open(RedbStoreConfig::default())?;
//! let pool = LeasePool::new(PoolConfig::default(), Arc::new(store));
//! pool.start().await?;
//!
//! let leased = pool.request_accounts(&LeaseRequest::new("sysA", 2))?;
//! pool.submit(serde_json::json!({"username": leased[0].username, "level": 12}))?;
//!
//! pool.stop().await?;
//! ```

mod allocator;
mod applier;
mod config;
mod error;
mod queue;
mod reaper;
mod seed;
mod stats;
pub mod transitions;

pub use allocator::Allocator;
pub use applier::{ApplierMetrics, ApplierStats};
pub use config::{
    DEFAULT_ALLOCATION_LOCK_TIMEOUT_SECS, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_REAPER_INTERVAL_SECS,
    DEFAULT_RELEASE_TIMEOUT_MINS, PoolConfig, RetryPolicy,
};
pub use error::{PoolError, PoolResult};
pub use queue::UpdateQueue;
pub use seed::{SeedAccount, SeedOptions, SeedReport};
pub use stats::{ConditionRow, PoolStatus, QueueStatus};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use leasepool_core::{
    AccountFilter, Clock, LeaseRecord, LeaseRequest, ReleaseRequest, SystemClock, UpdatePatch,
};
use leasepool_storage::AccountStore;

use crate::applier::Applier;
use crate::reaper::{Reaper, reap_idle};

/// Account pool coordinator
///
/// Lease requests are served on the caller's thread. Updates are accepted
/// into a bounded queue and applied in submission order by a background
/// task once the pool is [started](Self::start).
pub struct LeasePool {
    config: PoolConfig,
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    allocator: Allocator,
    queue: UpdateQueue,
    /// Consumer end of the queue, taken by the applier on start
    updates: Mutex<Option<mpsc::Receiver<UpdatePatch>>>,
    metrics: Arc<ApplierMetrics>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Whether the pool has been started
    started: AtomicBool,
}

impl LeasePool {
    /// Create a pool over `store` using the system clock
    ///
    /// Call [`start`](Self::start) to begin applying updates and reclaiming
    /// idle leases.
    pub fn new(config: PoolConfig, store: Arc<dyn AccountStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Create a pool with an explicit time source
    pub fn with_clock(config: PoolConfig, store: Arc<dyn AccountStore>, clock: Arc<dyn Clock>) -> Self {
        let allocator = Allocator::new(store.clone(), clock.clone(), config.allocation_lock_timeout);
        let (queue, updates) = UpdateQueue::channel(config.max_queue_size);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            clock,
            allocator,
            queue,
            updates: Mutex::new(Some(updates)),
            metrics: Arc::new(ApplierMetrics::default()),
            shutdown_tx,
            background_tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Start the applier and reaper tasks
    #[instrument(skip(self))]
    pub async fn start(&self) -> PoolResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PoolError::AlreadyStarted);
        }

        // The queue cannot be reopened once a previous run closed it
        let Some(updates) = self.updates.lock().take() else {
            self.started.store(false, Ordering::SeqCst);
            return Err(PoolError::Closed);
        };

        let applier_task = Applier::spawn(
            self.store.clone(),
            self.clock.clone(),
            self.config.retry.clone(),
            updates,
            self.shutdown_tx.subscribe(),
            self.metrics.clone(),
        );

        let reaper_task = Reaper::spawn(
            self.store.clone(),
            self.clock.clone(),
            self.config.account_release_timeout,
            self.config.reaper_interval,
            self.shutdown_tx.subscribe(),
        );

        {
            let mut tasks = self.background_tasks.lock();
            tasks.push(applier_task);
            tasks.push(reaper_task);
        }

        info!(
            max_queue_size = self.queue.capacity(),
            release_timeout_mins = self.config.account_release_timeout.as_secs() / 60,
            "Pool started"
        );
        Ok(())
    }

    /// Stop the pool
    ///
    /// Accepted updates are applied before this returns; later submissions
    /// fail with [`PoolError::Closed`].
    #[instrument(skip(self))]
    pub async fn stop(&self) -> PoolResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already stopped
        }

        // Signal shutdown
        let _ = self.shutdown_tx.send(());

        // Wait for background tasks
        let tasks: Vec<_> = self.background_tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task failed during shutdown");
            }
        }

        info!(stats = ?self.metrics.snapshot(), "Pool stopped");
        Ok(())
    }

    /// Check if the pool is started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Lease accounts to a system
    pub fn request_accounts(&self, request: &LeaseRequest) -> PoolResult<Vec<LeaseRecord>> {
        self.allocator.request(request)
    }

    /// Enqueue one raw update patch
    pub fn submit(&self, patch: Value) -> PoolResult<()> {
        self.queue.submit(patch)
    }

    /// Enqueue several raw update patches, all or nothing
    pub fn submit_batch(&self, patches: Vec<Value>) -> PoolResult<()> {
        self.queue.submit_batch(patches)
    }

    /// Enqueue releases, all or nothing
    pub fn release(&self, requests: Vec<ReleaseRequest>) -> PoolResult<()> {
        self.queue.release(requests)
    }

    /// Import accounts that do not exist yet
    pub fn seed(&self, accounts: Vec<SeedAccount>, options: SeedOptions) -> PoolResult<SeedReport> {
        seed::seed_accounts(self.store.as_ref(), self.clock.as_ref(), accounts, options)
    }

    /// Run one reclamation cycle now; returns the number of released leases
    pub fn reap_idle(&self) -> PoolResult<usize> {
        let released = reap_idle(
            self.store.as_ref(),
            self.clock.as_ref(),
            self.config.account_release_timeout,
        )?;
        Ok(released)
    }

    /// Patches accepted but not yet applied
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Occupancy, queue and applier statistics
    pub fn status(&self) -> PoolResult<PoolStatus> {
        let accounts = self.store.scan(&AccountFilter::all(), None)?;
        Ok(PoolStatus {
            total_accounts: accounts.len(),
            conditions: stats::condition_rows(&accounts),
            queue: QueueStatus {
                depth: self.queue.depth(),
                capacity: self.queue.capacity(),
            },
            applier: self.metrics.snapshot(),
            recent_events: self.store.recent_events(stats::RECENT_EVENTS)?,
        })
    }

    /// The underlying account store
    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}
