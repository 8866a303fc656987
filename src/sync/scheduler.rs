//! Timer loop that dispatches sync jobs.
//!
//! The loop only waits on its two intervals and the cancellation signal; every job
//! runs as its own tracked task so a slow job never delays a tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::task::TaskTracker;

use super::{
    run_task, sync_event_data, EventScope, EventsResource, OverlapPolicy, SyncConfig, SyncContext,
    TeamsResource,
};

/// A unit of work dispatched on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Events,
    Teams,
    AllEventData,
    ActiveEventData,
}

impl Job {
    const COUNT: usize = 4;

    fn index(&self) -> usize {
        match self {
            Job::Events => 0,
            Job::Teams => 1,
            Job::AllEventData => 2,
            Job::ActiveEventData => 3,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Job::Events => "events",
            Job::Teams => "teams",
            Job::AllEventData => "all_event_data",
            Job::ActiveEventData => "active_event_data",
        }
    }
}

type BusyFlags = Arc<[AtomicBool; Job::COUNT]>;

/// Marks a job in flight; released on drop, including when the task panics.
struct BusyGuard {
    flags: BusyFlags,
    index: usize,
}

impl BusyGuard {
    fn acquire(flags: &BusyFlags, job: Job) -> Option<Self> {
        let index = job.index();
        flags[index]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flags: Arc::clone(flags),
                index,
            })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flags[self.index].store(false, Ordering::Release);
    }
}

pub(crate) struct Scheduler {
    ctx: SyncContext,
    config: SyncConfig,
    tracker: TaskTracker,
    busy: BusyFlags,
}

impl Scheduler {
    pub(crate) fn new(ctx: SyncContext, config: SyncConfig, tracker: TaskTracker) -> Self {
        Self {
            ctx,
            config,
            tracker,
            busy: Arc::new(Default::default()),
        }
    }

    /// Run until the context is cancelled. The first slow tick fires immediately and
    /// seeds everything; the fast cadence starts one interval later.
    pub(crate) async fn run(self) {
        let mut slow = time::interval(self.config.slow_interval);
        let mut fast = time::interval_at(
            Instant::now() + self.config.fast_interval,
            self.config.fast_interval,
        );
        slow.set_missed_tick_behavior(MissedTickBehavior::Delay);
        fast.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            year = self.config.year,
            slow_interval = ?self.config.slow_interval,
            fast_interval = ?self.config.fast_interval,
            "scheduler started"
        );

        let mut seeded = false;
        loop {
            tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => break,
                _ = slow.tick() => {
                    if !seeded {
                        tracing::info!("seeding TBA data");
                        seeded = true;
                    }
                    self.ctx.stats.record_slow_tick();
                    self.dispatch(Job::Events);
                    self.dispatch(Job::Teams);
                    self.dispatch(Job::AllEventData);
                }
                _ = fast.tick() => {
                    self.ctx.stats.record_fast_tick();
                    self.dispatch(Job::ActiveEventData);
                }
            }
        }

        tracing::info!("scheduler stopped");
    }

    fn dispatch(&self, job: Job) {
        let guard = match self.config.overlap_policy {
            OverlapPolicy::Concurrent => None,
            OverlapPolicy::SkipIfBusy => match BusyGuard::acquire(&self.busy, job) {
                Some(guard) => Some(guard),
                None => {
                    self.ctx.stats.record_skipped();
                    tracing::debug!(job = job.as_str(), "previous run still in flight, skipping");
                    return;
                }
            },
        };

        let ctx = self.ctx.clone();
        let year = self.config.year;
        let policy = self.config.fanout_policy;

        self.tracker.spawn(async move {
            let _guard = guard;
            match job {
                Job::Events => {
                    run_task(&ctx, &EventsResource { year }).await;
                }
                Job::Teams => {
                    run_task(&ctx, &TeamsResource).await;
                }
                Job::AllEventData | Job::ActiveEventData => {
                    let scope = if job == Job::AllEventData {
                        EventScope::All
                    } else {
                        EventScope::Active
                    };
                    let report = sync_event_data(&ctx, scope, policy).await;
                    tracing::debug!(
                        job = job.as_str(),
                        total = report.total,
                        completed = report.completed.len(),
                        failed = report.failed.len(),
                        skipped = report.skipped.len(),
                        "per-event pass finished"
                    );
                }
            }
        });
    }
}
