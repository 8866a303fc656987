//! Upstream read API.
//!
//! The engine only sees the [`Upstream`] trait; [`TbaClient`] is the production
//! implementation backed by The Blue Alliance v3 API.

mod client;
mod wire;

pub use client::TbaClient;

use async_trait::async_trait;

use crate::errors::UpstreamError;
use crate::models::{Event, EventTeamRanking, Match, Team};

/// Result of a conditional fetch that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    /// Nothing changed since the last successful fetch; carries no records.
    Unchanged,
    /// A fresh, complete snapshot.
    Data(T),
}

/// Identifies the cached validators behind one logical fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey<'a> {
    Events(i32),
    Teams,
    Matches(&'a str),
    Rankings(&'a str),
}

/// Read-only competition data source.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// All events listed for a season.
    async fn get_events(&self, year: i32) -> Result<Fetched<Vec<Event>>, UpstreamError>;

    /// The full team roster.
    async fn get_teams(&self) -> Result<Fetched<Vec<Team>>, UpstreamError>;

    /// All matches of one event.
    async fn get_matches(&self, event_key: &str) -> Result<Fetched<Vec<Match>>, UpstreamError>;

    /// Current team rankings of one event.
    async fn get_team_rankings(
        &self,
        event_key: &str,
    ) -> Result<Fetched<Vec<EventTeamRanking>>, UpstreamError>;

    /// Check that the upstream is reachable.
    async fn ping(&self) -> Result<(), UpstreamError>;

    /// Drop any validator cached for `key`, so the next fetch returns data even if
    /// upstream has not changed. Called when a fetched snapshot was not stored.
    fn invalidate(&self, _key: CacheKey<'_>) {}
}
