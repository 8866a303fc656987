//! One resource sync run: fetch, then persist, then mark missing records deleted.
//!
//! There is no retry inside a run. Any failure ends the run and the next tick of
//! the owning job tries again.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{Resource, SyncStats};
use crate::db::Store;
use crate::errors::SyncError;
use crate::upstream::{Fetched, Upstream};

/// Shared handles every sync run works with.
#[derive(Clone)]
pub struct SyncContext {
    pub upstream: Arc<dyn Upstream>,
    pub store: Arc<dyn Store>,
    /// Root cancellation signal owned by the engine
    pub cancel: CancellationToken,
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
    pub stats: Arc<SyncStats>,
}

impl SyncContext {
    /// Run one step under the cancellation signal and a timeout.
    ///
    /// A cancelled context never starts the step; a step in flight is dropped at
    /// cancellation, which rolls back any open store transaction.
    pub(crate) async fn step<T, E, F>(&self, limit: Duration, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, E>>,
        SyncError: From<E>,
    {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            result = tokio::time::timeout(limit, fut) => result,
        };

        match result {
            Ok(Ok(value)) => Ok(value),
            // A step failing because shutdown tore down its connection is still
            // a cancellation.
            Ok(Err(_)) | Err(_) if self.cancel.is_cancelled() => Err(SyncError::Cancelled),
            Ok(Err(err)) => Err(SyncError::from(err)),
            Err(_) => Err(SyncError::Timeout(limit)),
        }
    }
}

/// The step a run was in when it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Persist,
    MarkDeleted,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Fetch => "fetch",
            Step::Persist => "persist",
            Step::MarkDeleted => "mark_deleted",
        })
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// A fresh snapshot of `count` records was persisted.
    Synced { count: usize },
    /// Upstream reported no change; nothing was written.
    Unchanged,
    Failed { step: Step, error: SyncError },
    Cancelled,
}

impl TaskOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }
}

/// Run `resource` through fetch, persist and (where it applies) deletion marking.
pub async fn run_task<R: Resource>(ctx: &SyncContext, resource: &R) -> TaskOutcome {
    let kind = resource.kind();
    let span = tracing::info_span!("sync", kind = %kind, scope = resource.scope());

    async move {
        let outcome = match run_steps(ctx, resource).await {
            Ok(Some(count)) => TaskOutcome::Synced { count },
            Ok(None) => TaskOutcome::Unchanged,
            Err((_, SyncError::Cancelled)) => TaskOutcome::Cancelled,
            Err((step, error)) => TaskOutcome::Failed { step, error },
        };

        match &outcome {
            TaskOutcome::Synced { count } => {
                ctx.stats.record_synced(kind);
                tracing::info!(count, "synced");
            }
            TaskOutcome::Unchanged => {
                ctx.stats.record_unchanged(kind);
                tracing::debug!("unchanged upstream, skipping");
            }
            TaskOutcome::Failed { step, error } => {
                ctx.stats.record_failed();
                tracing::error!(%step, code = error.error_code(), error = %error, "sync run failed");
            }
            TaskOutcome::Cancelled => {
                ctx.stats.record_cancelled();
                tracing::debug!("cancelled");
            }
        }

        // A snapshot that was fetched but not fully stored must be served again on
        // the next run rather than answered with "not modified".
        if outcome.is_failed() || outcome.is_cancelled() {
            ctx.upstream.invalidate(resource.cache_key());
        }

        outcome
    }
    .instrument(span)
    .await
}

/// `Ok(None)` means unchanged.
async fn run_steps<R: Resource>(
    ctx: &SyncContext,
    resource: &R,
) -> Result<Option<usize>, (Step, SyncError)> {
    let fetched = ctx
        .step(ctx.fetch_timeout, resource.fetch(ctx.upstream.as_ref()))
        .await
        .map_err(|e| (Step::Fetch, e))?;

    let records = match fetched {
        Fetched::Unchanged => return Ok(None),
        Fetched::Data(records) => records,
    };

    ctx.step(
        ctx.store_timeout,
        resource.persist(ctx.store.as_ref(), &records),
    )
    .await
    .map_err(|e| (Step::Persist, e))?;

    // Deletion marking must see exactly the snapshot that was just persisted.
    if resource.tracks_deletions() {
        ctx.step(
            ctx.store_timeout,
            resource.mark_missing_deleted(ctx.store.as_ref(), &records),
        )
        .await
        .map_err(|e| (Step::MarkDeleted, e))?;
    }

    Ok(Some(records.len()))
}
