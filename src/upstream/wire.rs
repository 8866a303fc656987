//! TBA v3 response shapes and their conversion into store models.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use crate::errors::UpstreamError;
use crate::models::{Event, EventTeamRanking, Location, Match, Team, Webcast, WebcastType};

const RANKING_SCORE: &str = "Ranking Score";

#[derive(Debug, Deserialize)]
struct District {
    abbreviation: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct WireWebcast {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: String,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    key: String,
    name: String,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    district: Option<District>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
    #[serde(default)]
    location_name: Option<String>,
    #[serde(default)]
    week: Option<i32>,
    start_date: String,
    end_date: String,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    webcasts: Option<Vec<WireWebcast>>,
}

#[derive(Debug, Deserialize)]
struct WireTeam {
    key: String,
    team_number: i32,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state_prov: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    rookie_year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct WireAlliance {
    #[serde(default)]
    score: Option<i32>,
    #[serde(default)]
    team_keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireAlliances {
    #[serde(default)]
    red: WireAlliance,
    #[serde(default)]
    blue: WireAlliance,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    key: String,
    #[serde(default)]
    predicted_time: Option<i64>,
    #[serde(default)]
    actual_time: Option<i64>,
    #[serde(default, rename = "time")]
    scheduled_time: Option<i64>,
    #[serde(default)]
    alliances: Option<WireAlliances>,
}

#[derive(Debug, Deserialize)]
struct WireRank {
    rank: i32,
    team_key: String,
    #[serde(default)]
    sort_orders: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct SortOrderInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireRankings {
    #[serde(default)]
    rankings: Vec<WireRank>,
    #[serde(default)]
    sort_order_info: Vec<SortOrderInfo>,
}

fn decode<T: for<'de> Deserialize<'de>>(path: &str, body: &[u8]) -> Result<T, UpstreamError> {
    serde_json::from_slice(body).map_err(|source| UpstreamError::Decode {
        path: path.to_string(),
        source,
    })
}

fn parse_date(path: &str, key: &str, date: &str) -> Result<NaiveDate, UpstreamError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| UpstreamError::Invalid {
        path: path.to_string(),
        message: format!("event {} has bad date {:?}: {}", key, date, e),
    })
}

/// Zero and null both mean "no timestamp".
fn unix_time(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.filter(|&s| s != 0)
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
}

/// TBA reports unplayed scores as -1.
fn score(score: Option<i32>) -> Option<i32> {
    score.filter(|&s| s != -1)
}

pub(crate) fn decode_events(path: &str, year: i32, body: &[u8]) -> Result<Vec<Event>, UpstreamError> {
    let wire: Vec<WireEvent> = decode(path, body)?;

    wire.into_iter()
        .map(|e| {
            let start_date = parse_date(path, &e.key, &e.start_date)?;
            let end_date = parse_date(path, &e.key, &e.end_date)?;

            let webcasts = e
                .webcasts
                .unwrap_or_default()
                .into_iter()
                .filter_map(|w| {
                    let kind = WebcastType::from_str(&w.kind)?;
                    Some(Webcast {
                        kind,
                        url: kind.url(&w.channel),
                    })
                })
                .collect();

            let name = match e.short_name {
                Some(short) if !short.is_empty() => short,
                _ => e.name,
            };

            let (district, full_district) = match e.district {
                Some(d) => (Some(d.abbreviation), Some(d.display_name)),
                None => (None, None),
            };

            Ok(Event {
                key: e.key,
                year,
                name,
                district,
                full_district,
                week: e.week,
                start_date,
                end_date,
                timezone: e.timezone,
                webcasts,
                location: Location {
                    name: e.location_name,
                    lat: e.lat,
                    lon: e.lng,
                },
                deleted: false,
            })
        })
        .collect()
}

pub(crate) fn decode_teams(path: &str, body: &[u8]) -> Result<Vec<Team>, UpstreamError> {
    let wire: Vec<WireTeam> = decode(path, body)?;

    Ok(wire
        .into_iter()
        .map(|t| Team {
            key: t.key,
            number: t.team_number,
            nickname: t.nickname,
            city: t.city,
            state_prov: t.state_prov,
            country: t.country,
            rookie_year: t.rookie_year,
        })
        .collect())
}

pub(crate) fn decode_matches(
    path: &str,
    event_key: &str,
    body: &[u8],
) -> Result<Vec<Match>, UpstreamError> {
    let wire: Vec<WireMatch> = decode(path, body)?;

    Ok(wire
        .into_iter()
        .map(|m| {
            let alliances = m.alliances.unwrap_or_default();
            Match {
                key: m.key,
                event_key: event_key.to_string(),
                predicted_time: unix_time(m.predicted_time),
                scheduled_time: unix_time(m.scheduled_time),
                actual_time: unix_time(m.actual_time),
                red_score: score(alliances.red.score),
                blue_score: score(alliances.blue.score),
                red_alliance: alliances.red.team_keys,
                blue_alliance: alliances.blue.team_keys,
                deleted: false,
            }
        })
        .collect())
}

pub(crate) fn decode_rankings(
    path: &str,
    event_key: &str,
    body: &[u8],
) -> Result<Vec<EventTeamRanking>, UpstreamError> {
    // Events without rankings yet respond with a literal `null`.
    let wire: Option<WireRankings> = decode(path, body)?;
    let Some(wire) = wire else {
        return Ok(Vec::new());
    };

    let score_index = wire
        .sort_order_info
        .iter()
        .position(|info| info.name == RANKING_SCORE);

    Ok(wire
        .rankings
        .into_iter()
        .map(|r| EventTeamRanking {
            event_key: event_key.to_string(),
            team_key: r.team_key,
            rank: r.rank,
            ranking_score: score_index
                .and_then(|i| r.sort_orders.as_ref().and_then(|orders| orders.get(i)))
                .copied(),
        })
        .collect())
}
