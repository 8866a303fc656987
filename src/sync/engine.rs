//! Engine lifecycle: at most one scheduler loop, idempotent start and stop.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::scheduler::Scheduler;
use super::{SyncConfig, SyncContext, SyncStats};
use crate::db::Store;
use crate::upstream::Upstream;

/// A started scheduler and the work it dispatched.
struct Running {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Running {
    fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
    }
}

/// Background sync engine.
///
/// `begin` and `end` may be called any number of times from any thread.
pub struct Engine {
    upstream: Arc<dyn Upstream>,
    store: Arc<dyn Store>,
    config: SyncConfig,
    stats: Arc<SyncStats>,
    runtime: Handle,
    state: Mutex<Option<Running>>,
}

impl Engine {
    /// Create a stopped engine. Must be called from within a Tokio runtime, which
    /// is where the scheduler will later run.
    pub fn new(upstream: Arc<dyn Upstream>, store: Arc<dyn Store>, config: SyncConfig) -> Self {
        Self {
            upstream,
            store,
            config,
            stats: Arc::new(SyncStats::default()),
            runtime: Handle::current(),
            state: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<Running>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the scheduler loop. Returns `false` if it was already running.
    pub fn begin(&self) -> bool {
        let mut state = self.state();
        if state.is_some() {
            tracing::debug!("background TBA updates already running");
            return false;
        }

        tracing::info!("beginning background TBA updates");

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let ctx = SyncContext {
            upstream: Arc::clone(&self.upstream),
            store: Arc::clone(&self.store),
            cancel: cancel.clone(),
            fetch_timeout: self.config.fetch_timeout,
            store_timeout: self.config.store_timeout,
            stats: Arc::clone(&self.stats),
        };

        let scheduler = Scheduler::new(ctx, self.config.clone(), tracker.clone());
        tracker.spawn_on(scheduler.run(), &self.runtime);

        *state = Some(Running { cancel, tracker });
        true
    }

    /// Cancel the scheduler and all in-flight runs, then mark the engine stopped.
    /// Returns immediately; returns `false` if it was not running.
    pub fn end(&self) -> bool {
        match self.state().take() {
            Some(running) => {
                tracing::info!("ending background TBA updates");
                running.stop();
                true
            }
            None => false,
        }
    }

    /// Like [`end`](Self::end), then wait up to the drain timeout for in-flight
    /// runs to reach a checkpoint and exit.
    pub async fn shutdown(&self) {
        let Some(running) = self.state().take() else {
            return;
        };

        tracing::info!("ending background TBA updates");
        running.stop();

        if tokio::time::timeout(self.config.drain_timeout, running.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = running.tracker.len(),
                "drain timed out, abandoning in-flight sync runs"
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().is_some()
    }

    pub fn stats(&self) -> Arc<SyncStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.end();
    }
}
