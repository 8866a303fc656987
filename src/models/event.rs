//! Event model.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Platform a webcast is streamed on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WebcastType {
    Twitch,
    Youtube,
}

impl WebcastType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "twitch" => Some(WebcastType::Twitch),
            "youtube" => Some(WebcastType::Youtube),
            _ => None,
        }
    }

    /// Public URL for a channel on this platform.
    pub fn url(&self, channel: &str) -> String {
        match self {
            WebcastType::Twitch => format!("https://www.twitch.tv/{}", channel),
            WebcastType::Youtube => format!("https://www.youtube.com/watch?v={}", channel),
        }
    }
}

/// A livestream of an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Webcast {
    #[serde(rename = "type")]
    pub kind: WebcastType,
    pub url: String,
}

/// Where an event takes place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

/// A competition event for one season.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub key: String,
    /// Season the event was listed under upstream
    pub year: i32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub webcasts: Vec<Webcast>,
    #[serde(default)]
    pub location: Location,
    /// No longer reported upstream for its season, but retained locally
    #[serde(default)]
    pub deleted: bool,
}

impl Event {
    /// An event is active from the day before it starts until the day after it ends.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.start_date - Duration::days(1) <= today && today <= self.end_date + Duration::days(1)
    }
}
