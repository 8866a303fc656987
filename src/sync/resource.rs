//! The four synchronized resources: how each is fetched, persisted and, where it
//! applies, soft-deleted.

use async_trait::async_trait;

use super::ResourceKind;
use crate::db::Store;
use crate::errors::{StoreError, UpstreamError};
use crate::models::{Event, EventTeamRanking, Match, Team};
use crate::upstream::{CacheKey, Fetched, Upstream};

/// One resource kind, optionally narrowed to a scope key.
#[async_trait]
pub trait Resource: Send + Sync {
    type Record: Send + Sync;

    fn kind(&self) -> ResourceKind;

    /// The event key for per-event resources.
    fn scope(&self) -> Option<&str> {
        None
    }

    /// The upstream cache entry [`fetch`](Self::fetch) reads through.
    fn cache_key(&self) -> CacheKey<'_>;

    /// Exactly one logical upstream read.
    async fn fetch(
        &self,
        upstream: &dyn Upstream,
    ) -> Result<Fetched<Vec<Self::Record>>, UpstreamError>;

    async fn persist(&self, store: &dyn Store, records: &[Self::Record]) -> Result<(), StoreError>;

    /// Whether records missing from a fresh snapshot get soft-deleted.
    fn tracks_deletions(&self) -> bool {
        false
    }

    /// Only ever called with the records [`persist`](Self::persist) just stored.
    async fn mark_missing_deleted(
        &self,
        _store: &dyn Store,
        _records: &[Self::Record],
    ) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Every event of one season. Deletion is relative to that season's list.
pub struct EventsResource {
    pub year: i32,
}

#[async_trait]
impl Resource for EventsResource {
    type Record = Event;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Events
    }

    fn cache_key(&self) -> CacheKey<'_> {
        CacheKey::Events(self.year)
    }

    async fn fetch(&self, upstream: &dyn Upstream) -> Result<Fetched<Vec<Event>>, UpstreamError> {
        upstream.get_events(self.year).await
    }

    async fn persist(&self, store: &dyn Store, records: &[Event]) -> Result<(), StoreError> {
        store.events_upsert(records).await
    }

    fn tracks_deletions(&self) -> bool {
        true
    }

    async fn mark_missing_deleted(
        &self,
        store: &dyn Store,
        records: &[Event],
    ) -> Result<(), StoreError> {
        store.mark_events_deleted(self.year, records).await?;
        store.mark_deleted_events_matches(self.year).await
    }
}

/// The full team roster.
pub struct TeamsResource;

#[async_trait]
impl Resource for TeamsResource {
    type Record = Team;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Teams
    }

    fn cache_key(&self) -> CacheKey<'_> {
        CacheKey::Teams
    }

    async fn fetch(&self, upstream: &dyn Upstream) -> Result<Fetched<Vec<Team>>, UpstreamError> {
        upstream.get_teams().await
    }

    async fn persist(&self, store: &dyn Store, records: &[Team]) -> Result<(), StoreError> {
        store.teams_upsert(records).await
    }
}

/// Matches of one event. Deletion is relative to that event's list only.
pub struct MatchesResource {
    pub event_key: String,
}

#[async_trait]
impl Resource for MatchesResource {
    type Record = Match;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Matches
    }

    fn scope(&self) -> Option<&str> {
        Some(&self.event_key)
    }

    fn cache_key(&self) -> CacheKey<'_> {
        CacheKey::Matches(&self.event_key)
    }

    async fn fetch(&self, upstream: &dyn Upstream) -> Result<Fetched<Vec<Match>>, UpstreamError> {
        upstream.get_matches(&self.event_key).await
    }

    async fn persist(&self, store: &dyn Store, records: &[Match]) -> Result<(), StoreError> {
        store.update_matches(&self.event_key, records).await
    }

    fn tracks_deletions(&self) -> bool {
        true
    }

    async fn mark_missing_deleted(
        &self,
        store: &dyn Store,
        records: &[Match],
    ) -> Result<(), StoreError> {
        store.mark_matches_deleted(&self.event_key, records).await
    }
}

/// Rankings of one event, replaced wholesale.
pub struct RankingsResource {
    pub event_key: String,
}

#[async_trait]
impl Resource for RankingsResource {
    type Record = EventTeamRanking;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Rankings
    }

    fn scope(&self) -> Option<&str> {
        Some(&self.event_key)
    }

    fn cache_key(&self) -> CacheKey<'_> {
        CacheKey::Rankings(&self.event_key)
    }

    async fn fetch(
        &self,
        upstream: &dyn Upstream,
    ) -> Result<Fetched<Vec<EventTeamRanking>>, UpstreamError> {
        upstream.get_team_rankings(&self.event_key).await
    }

    async fn persist(
        &self,
        store: &dyn Store,
        records: &[EventTeamRanking],
    ) -> Result<(), StoreError> {
        store.upsert_rankings(&self.event_key, records).await
    }
}
