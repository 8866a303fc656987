//! Database module for SQLite persistence.
//!
//! SQLite is the local copy every reader uses; only the sync engine writes to it.

mod repository;

pub use repository::*;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::errors::StoreError;
use crate::models::{Event, EventTeamRanking, Match, Team};

/// Persistence operations the sync engine relies on.
///
/// Every write is idempotent. The `mark_*_deleted` operations must only ever be
/// given the exact record set that was just persisted for the same scope.
#[async_trait]
pub trait Store: Send + Sync {
    /// Non-deleted events, optionally only those happening around today.
    async fn get_events(&self, active_only: bool) -> Result<Vec<Event>, StoreError>;

    async fn events_upsert(&self, events: &[Event]) -> Result<(), StoreError>;

    /// Soft-delete events of `year` that are missing from `events`.
    async fn mark_events_deleted(&self, year: i32, events: &[Event]) -> Result<(), StoreError>;

    async fn teams_upsert(&self, teams: &[Team]) -> Result<(), StoreError>;

    async fn update_matches(&self, event_key: &str, matches: &[Match]) -> Result<(), StoreError>;

    /// Soft-delete matches of `event_key` that are missing from `matches`.
    async fn mark_matches_deleted(
        &self,
        event_key: &str,
        matches: &[Match],
    ) -> Result<(), StoreError>;

    /// Soft-delete every match whose event of `year` is itself soft-deleted.
    async fn mark_deleted_events_matches(&self, year: i32) -> Result<(), StoreError>;

    /// Replace the ranking set of `event_key`.
    async fn upsert_rankings(
        &self,
        event_key: &str,
        rankings: &[EventTeamRanking],
    ) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    // Shared by every concurrent sync task.
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            key TEXT PRIMARY KEY,
            year INTEGER NOT NULL,
            name TEXT NOT NULL,
            district TEXT,
            full_district TEXT,
            week INTEGER,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            timezone TEXT,
            location_name TEXT,
            lat REAL,
            lon REAL,
            webcasts TEXT NOT NULL DEFAULT '[]',
            deleted INTEGER NOT NULL DEFAULT 0,
            synced_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            key TEXT PRIMARY KEY,
            number INTEGER NOT NULL,
            nickname TEXT,
            city TEXT,
            state_prov TEXT,
            country TEXT,
            rookie_year INTEGER,
            synced_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            key TEXT PRIMARY KEY,
            event_key TEXT NOT NULL,
            predicted_time TEXT,
            scheduled_time TEXT,
            actual_time TEXT,
            red_score INTEGER,
            blue_score INTEGER,
            red_alliance TEXT NOT NULL DEFAULT '[]',
            blue_alliance TEXT NOT NULL DEFAULT '[]',
            deleted INTEGER NOT NULL DEFAULT 0,
            synced_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS event_rankings (
            event_key TEXT NOT NULL,
            team_key TEXT NOT NULL,
            rank INTEGER NOT NULL,
            ranking_score REAL,
            synced_at TEXT NOT NULL,
            PRIMARY KEY (event_key, team_key)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for the scoped deletion and active-event queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_events_year ON events(year);
        CREATE INDEX IF NOT EXISTS idx_events_dates ON events(start_date, end_date);
        CREATE INDEX IF NOT EXISTS idx_matches_event_key ON matches(event_key);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
