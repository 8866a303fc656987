//! Per-event fan-out of match and ranking syncs.
//!
//! Events are walked in order. For each one the matches run and the rankings run
//! execute concurrently and are both awaited before moving to the next event, so a
//! failed matches run never stops the same event's rankings.

use super::{run_task, FanoutPolicy, MatchesResource, RankingsResource, SyncContext};
use crate::models::Event;

/// Which stored events a pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    All,
    Active,
}

impl EventScope {
    fn active_only(&self) -> bool {
        matches!(self, EventScope::Active)
    }
}

/// Summary of one fan-out pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    /// Events the pass was given
    pub total: usize,
    /// Events whose runs all finished without failure
    pub completed: Vec<String>,
    /// Events with at least one failed run
    pub failed: Vec<String>,
    /// Events never started because the pass stopped early
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

/// Load events from the store and sync their matches and rankings.
pub async fn sync_event_data(
    ctx: &SyncContext,
    scope: EventScope,
    policy: FanoutPolicy,
) -> FanoutReport {
    let events = match ctx
        .step(ctx.store_timeout, ctx.store.get_events(scope.active_only()))
        .await
    {
        Ok(events) => events,
        Err(err) if err.is_cancelled() => {
            return FanoutReport {
                cancelled: true,
                ..FanoutReport::default()
            };
        }
        Err(err) => {
            tracing::error!(?scope, code = err.error_code(), error = %err, "getting events from store");
            return FanoutReport::default();
        }
    };

    tracing::debug!(?scope, count = events.len(), "syncing per-event data");
    fan_out(ctx, &events, policy).await
}

/// Sync matches and rankings for each event in order.
pub(crate) async fn fan_out(
    ctx: &SyncContext,
    events: &[Event],
    policy: FanoutPolicy,
) -> FanoutReport {
    let mut report = FanoutReport {
        total: events.len(),
        ..FanoutReport::default()
    };

    for (i, event) in events.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            report.cancelled = true;
            report.skipped = remaining(&events[i..]);
            break;
        }

        let matches = MatchesResource {
            event_key: event.key.clone(),
        };
        let rankings = RankingsResource {
            event_key: event.key.clone(),
        };

        let (matches_outcome, rankings_outcome) =
            tokio::join!(run_task(ctx, &matches), run_task(ctx, &rankings));

        if matches_outcome.is_cancelled() || rankings_outcome.is_cancelled() {
            report.cancelled = true;
            report.skipped = remaining(&events[i + 1..]);
            break;
        }

        if matches_outcome.is_failed() || rankings_outcome.is_failed() {
            report.failed.push(event.key.clone());

            if policy == FanoutPolicy::AbortOnError {
                report.skipped = remaining(&events[i + 1..]);
                if !report.skipped.is_empty() {
                    tracing::warn!(
                        event_key = %event.key,
                        skipped = report.skipped.len(),
                        "aborting per-event pass after failure"
                    );
                }
                break;
            }
        } else {
            report.completed.push(event.key.clone());
        }
    }

    report
}

fn remaining(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.key.clone()).collect()
}
