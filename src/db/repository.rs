//! Database repository for competition data.
//!
//! Each write runs in a single transaction. Deletion marking compares keys against
//! a JSON array bound as one parameter and expanded with `json_each`.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::Store;
use crate::errors::StoreError;
use crate::models::{Event, EventTeamRanking, Location, Match, Team};

const EVENT_COLUMNS: &str = "key, year, name, district, full_district, week, start_date, end_date, \
     timezone, location_name, lat, lon, webcasts, deleted";

const MATCH_COLUMNS: &str = "key, event_key, predicted_time, scheduled_time, actual_time, \
     red_score, blue_score, red_alliance, blue_alliance, deleted";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Non-deleted events, restricted to those active on `active_on` when given.
    pub async fn get_events_on(
        &self,
        active_on: Option<NaiveDate>,
    ) -> Result<Vec<Event>, StoreError> {
        let rows = match active_on {
            Some(today) => {
                sqlx::query(&format!(
                    "SELECT {} FROM events
                     WHERE deleted = 0
                       AND date(start_date, '-1 day') <= ?1
                       AND ?1 <= date(end_date, '+1 day')
                     ORDER BY start_date, key",
                    EVENT_COLUMNS
                ))
                .bind(today)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM events WHERE deleted = 0 ORDER BY start_date, key",
                    EVENT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(event_from_row).collect()
    }

    /// Get an event by key, including soft-deleted ones.
    pub async fn get_event(&self, key: &str) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM events WHERE key = ?", EVENT_COLUMNS))
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    /// List all teams.
    pub async fn list_teams(&self) -> Result<Vec<Team>, StoreError> {
        let rows = sqlx::query(
            "SELECT key, number, nickname, city, state_prov, country, rookie_year FROM teams ORDER BY number",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(team_from_row).collect()
    }

    /// List all matches of an event, including soft-deleted ones.
    pub async fn list_matches(&self, event_key: &str) -> Result<Vec<Match>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM matches WHERE event_key = ? ORDER BY key",
            MATCH_COLUMNS
        ))
        .bind(event_key)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(match_from_row).collect()
    }

    /// List the current rankings of an event, best rank first.
    pub async fn list_rankings(&self, event_key: &str) -> Result<Vec<EventTeamRanking>, StoreError> {
        let rows = sqlx::query(
            "SELECT event_key, team_key, rank, ranking_score FROM event_rankings WHERE event_key = ? ORDER BY rank",
        )
        .bind(event_key)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EventTeamRanking {
                    event_key: row.try_get("event_key")?,
                    team_key: row.try_get("team_key")?,
                    rank: row.try_get("rank")?,
                    ranking_score: row.try_get("ranking_score")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Store for Repository {
    async fn get_events(&self, active_only: bool) -> Result<Vec<Event>, StoreError> {
        let active_on = active_only.then(|| Utc::now().date_naive());
        self.get_events_on(active_on).await
    }

    async fn events_upsert(&self, events: &[Event]) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for event in events {
            let webcasts = serde_json::to_string(&event.webcasts)?;

            sqlx::query(
                r#"INSERT INTO events (key, year, name, district, full_district, week, start_date,
                        end_date, timezone, location_name, lat, lon, webcasts, deleted, synced_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
                   ON CONFLICT (key) DO UPDATE SET
                        year = excluded.year, name = excluded.name, district = excluded.district,
                        full_district = excluded.full_district, week = excluded.week,
                        start_date = excluded.start_date, end_date = excluded.end_date,
                        timezone = excluded.timezone, location_name = excluded.location_name,
                        lat = excluded.lat, lon = excluded.lon, webcasts = excluded.webcasts,
                        deleted = 0, synced_at = excluded.synced_at"#,
            )
            .bind(&event.key)
            .bind(event.year)
            .bind(&event.name)
            .bind(&event.district)
            .bind(&event.full_district)
            .bind(event.week)
            .bind(event.start_date)
            .bind(event.end_date)
            .bind(&event.timezone)
            .bind(&event.location.name)
            .bind(event.location.lat)
            .bind(event.location.lon)
            .bind(&webcasts)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_events_deleted(&self, year: i32, events: &[Event]) -> Result<(), StoreError> {
        let keys = serde_json::to_string(&events.iter().map(|e| &e.key).collect::<Vec<_>>())?;

        let result = sqlx::query(
            r#"UPDATE events SET deleted = 1
               WHERE year = ? AND deleted = 0
                 AND key NOT IN (SELECT value FROM json_each(?))"#,
        )
        .bind(year)
        .bind(&keys)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(year, count = result.rows_affected(), "marked events deleted");
        }
        Ok(())
    }

    async fn teams_upsert(&self, teams: &[Team]) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for team in teams {
            sqlx::query(
                r#"INSERT INTO teams (key, number, nickname, city, state_prov, country, rookie_year, synced_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (key) DO UPDATE SET
                        number = excluded.number, nickname = excluded.nickname, city = excluded.city,
                        state_prov = excluded.state_prov, country = excluded.country,
                        rookie_year = excluded.rookie_year, synced_at = excluded.synced_at"#,
            )
            .bind(&team.key)
            .bind(team.number)
            .bind(&team.nickname)
            .bind(&team.city)
            .bind(&team.state_prov)
            .bind(&team.country)
            .bind(team.rookie_year)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_matches(&self, event_key: &str, matches: &[Match]) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for m in matches {
            let red = serde_json::to_string(&m.red_alliance)?;
            let blue = serde_json::to_string(&m.blue_alliance)?;

            sqlx::query(
                r#"INSERT INTO matches (key, event_key, predicted_time, scheduled_time, actual_time,
                        red_score, blue_score, red_alliance, blue_alliance, deleted, synced_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
                   ON CONFLICT (key) DO UPDATE SET
                        event_key = excluded.event_key, predicted_time = excluded.predicted_time,
                        scheduled_time = excluded.scheduled_time, actual_time = excluded.actual_time,
                        red_score = excluded.red_score, blue_score = excluded.blue_score,
                        red_alliance = excluded.red_alliance, blue_alliance = excluded.blue_alliance,
                        deleted = 0, synced_at = excluded.synced_at"#,
            )
            .bind(&m.key)
            .bind(event_key)
            .bind(m.predicted_time)
            .bind(m.scheduled_time)
            .bind(m.actual_time)
            .bind(m.red_score)
            .bind(m.blue_score)
            .bind(&red)
            .bind(&blue)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_matches_deleted(
        &self,
        event_key: &str,
        matches: &[Match],
    ) -> Result<(), StoreError> {
        let keys = serde_json::to_string(&matches.iter().map(|m| &m.key).collect::<Vec<_>>())?;

        let result = sqlx::query(
            r#"UPDATE matches SET deleted = 1
               WHERE event_key = ? AND deleted = 0
                 AND key NOT IN (SELECT value FROM json_each(?))"#,
        )
        .bind(event_key)
        .bind(&keys)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(
                event_key,
                count = result.rows_affected(),
                "marked matches deleted"
            );
        }
        Ok(())
    }

    async fn mark_deleted_events_matches(&self, year: i32) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE matches SET deleted = 1
               WHERE deleted = 0
                 AND event_key IN (SELECT key FROM events WHERE year = ? AND deleted = 1)"#,
        )
        .bind(year)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(
                year,
                count = result.rows_affected(),
                "marked matches of deleted events deleted"
            );
        }
        Ok(())
    }

    async fn upsert_rankings(
        &self,
        event_key: &str,
        rankings: &[EventTeamRanking],
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM event_rankings WHERE event_key = ?")
            .bind(event_key)
            .execute(&mut *tx)
            .await?;

        for ranking in rankings {
            sqlx::query(
                r#"INSERT INTO event_rankings (event_key, team_key, rank, ranking_score, synced_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT (event_key, team_key) DO UPDATE SET
                        rank = excluded.rank, ranking_score = excluded.ranking_score,
                        synced_at = excluded.synced_at"#,
            )
            .bind(event_key)
            .bind(&ranking.team_key)
            .bind(ranking.rank)
            .bind(ranking.ranking_score)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Helper functions for row conversion

fn event_from_row(row: &SqliteRow) -> Result<Event, StoreError> {
    let webcasts: String = row.try_get("webcasts")?;

    Ok(Event {
        key: row.try_get("key")?,
        year: row.try_get("year")?,
        name: row.try_get("name")?,
        district: row.try_get("district")?,
        full_district: row.try_get("full_district")?,
        week: row.try_get("week")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        timezone: row.try_get("timezone")?,
        webcasts: serde_json::from_str(&webcasts)?,
        location: Location {
            name: row.try_get("location_name")?,
            lat: row.try_get("lat")?,
            lon: row.try_get("lon")?,
        },
        deleted: row.try_get("deleted")?,
    })
}

fn team_from_row(row: &SqliteRow) -> Result<Team, StoreError> {
    Ok(Team {
        key: row.try_get("key")?,
        number: row.try_get("number")?,
        nickname: row.try_get("nickname")?,
        city: row.try_get("city")?,
        state_prov: row.try_get("state_prov")?,
        country: row.try_get("country")?,
        rookie_year: row.try_get("rookie_year")?,
    })
}

fn match_from_row(row: &SqliteRow) -> Result<Match, StoreError> {
    let red: String = row.try_get("red_alliance")?;
    let blue: String = row.try_get("blue_alliance")?;

    Ok(Match {
        key: row.try_get("key")?,
        event_key: row.try_get("event_key")?,
        predicted_time: row.try_get("predicted_time")?,
        scheduled_time: row.try_get("scheduled_time")?,
        actual_time: row.try_get("actual_time")?,
        red_score: row.try_get("red_score")?,
        blue_score: row.try_get("blue_score")?,
        red_alliance: serde_json::from_str(&red)?,
        blue_alliance: serde_json::from_str(&blue)?,
        deleted: row.try_get("deleted")?,
    })
}
