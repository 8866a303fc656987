//! Match model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single match played (or scheduled) at an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub key: String,
    pub event_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub red_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue_score: Option<i32>,
    pub red_alliance: Vec<String>,
    pub blue_alliance: Vec<String>,
    /// Absent from the owning event's latest match list
    #[serde(default)]
    pub deleted: bool,
}

impl Match {
    /// Best known time for the match: actual, then predicted, then scheduled.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.actual_time.or(self.predicted_time).or(self.scheduled_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_actual_time_is_authoritative() {
        let at = |secs| Some(Utc.timestamp_opt(secs, 0).unwrap());
        let mut m = Match {
            key: "2019orwil_qm1".to_string(),
            event_key: "2019orwil".to_string(),
            predicted_time: at(200),
            scheduled_time: at(100),
            actual_time: None,
            red_score: None,
            blue_score: None,
            red_alliance: Vec::new(),
            blue_alliance: Vec::new(),
            deleted: false,
        };
        assert_eq!(m.time(), at(200));

        m.actual_time = at(300);
        assert_eq!(m.time(), at(300));

        m.actual_time = None;
        m.predicted_time = None;
        assert_eq!(m.time(), at(100));
    }
}
