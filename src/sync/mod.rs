//! Background synchronization engine.
//!
//! Timer-driven jobs pull each resource kind from the [`Upstream`](crate::upstream::Upstream)
//! and reconcile it into the [`Store`](crate::db::Store). The only public controls are
//! [`Engine::begin`], [`Engine::end`] and [`Engine::shutdown`].

mod engine;
mod fanout;
mod resource;
mod scheduler;
mod stats;
mod task;

pub use engine::Engine;
pub use fanout::{sync_event_data, EventScope, FanoutReport};
pub use resource::{EventsResource, MatchesResource, RankingsResource, Resource, TeamsResource};
pub use stats::{StatsSnapshot, SyncStats};
pub use task::{run_task, Step, SyncContext, TaskOutcome};

use std::fmt;
use std::time::Duration;

use chrono::{Datelike, Utc};
use serde::Serialize;

/// One of the four synchronized data domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Events,
    Teams,
    Matches,
    Rankings,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Events => "events",
            ResourceKind::Teams => "teams",
            ResourceKind::Matches => "matches",
            ResourceKind::Rankings => "rankings",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a per-event pass does after one event fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FanoutPolicy {
    /// Record the failure and move on to the next event.
    #[default]
    ContinueOnError,
    /// Stop the pass; later events wait for the next tick.
    AbortOnError,
}

impl FanoutPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Some(FanoutPolicy::ContinueOnError),
            "abort" => Some(FanoutPolicy::AbortOnError),
            _ => None,
        }
    }
}

/// What a tick does when the previous run of the same job is still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    #[default]
    SkipIfBusy,
    Concurrent,
}

impl OverlapPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Some(OverlapPolicy::SkipIfBusy),
            "concurrent" => Some(OverlapPolicy::Concurrent),
            _ => None,
        }
    }
}

/// Engine settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Season whose events are synced
    pub year: i32,
    /// Events, teams and every event's matches and rankings
    pub slow_interval: Duration,
    /// Matches and rankings of active events only
    pub fast_interval: Duration,
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
    /// How long [`Engine::shutdown`] waits for in-flight work
    pub drain_timeout: Duration,
    pub fanout_policy: FanoutPolicy,
    pub overlap_policy: OverlapPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            year: Utc::now().year(),
            slow_interval: Duration::from_secs(15 * 60),
            fast_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(15),
            store_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(10),
            fanout_policy: FanoutPolicy::default(),
            overlap_policy: OverlapPolicy::default(),
        }
    }
}
